use base64::Engine;
use iced::widget::image::Handle;
use iced::widget::{
    button, column, container, horizontal_space, mouse_area, row, scrollable, text, text_editor,
};
use iced::{alignment, border, mouse, Alignment, Element, Length, Point, Theme};
use std::collections::HashMap;
use tracing::debug;

use crate::composer::{self, Composer, KeyAction};
use crate::conversation::{ContentPart, Role, Turn};
use crate::geometry::HitTarget;
use crate::session::Session;
use crate::Message;

pub const TITLE: &str = "Pexi Ai";

const HEADER_HEIGHT: f32 = 40.0;
/// Width reserved at the right of the header for the window buttons.
const CONTROLS_WIDTH: f32 = 160.0;
const BUBBLE_MAX_WIDTH: f32 = 560.0;
const PREVIEW_MAX_WIDTH: f32 = 320.0;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Decoded image parts keyed by turn id and part index.
pub type Previews = HashMap<(String, usize), Handle>;

/// Classifies a press at `cursor` (window-relative) on the header strip.
pub fn header_hit_target(cursor: Point, window_width: f32) -> HitTarget {
    if cursor.y <= HEADER_HEIGHT && cursor.x >= window_width - CONTROLS_WIDTH {
        HitTarget::Control
    } else {
        HitTarget::Header
    }
}

/// Decodes the image parts of `turn`. Other inline kinds get no preview.
pub fn image_previews(turn: &Turn) -> Vec<(usize, Handle)> {
    turn.parts()
        .iter()
        .enumerate()
        .filter_map(|(index, part)| match part {
            ContentPart::InlineData(inline) if inline.mime_type.starts_with("image/") => {
                match base64::engine::general_purpose::STANDARD.decode(&inline.data) {
                    Ok(bytes) => Some((index, Handle::from_bytes(bytes))),
                    Err(e) => {
                        debug!("skipping undecodable preview: {}", e);
                        None
                    }
                }
            }
            _ => None,
        })
        .collect()
}

pub fn header(dragging: bool) -> Element<'static, Message> {
    let control = |label: &'static str, message: Message| {
        button(text(label).size(14))
            .on_press(message)
            .padding([6, 10])
            .style(button::text)
    };

    let controls = row![
        control("⟲", Message::Reset),
        control("—", Message::Minimize),
        control("□", Message::ToggleMaximize),
        button(text("✕").size(14))
            .on_press(Message::Close)
            .padding([6, 10])
            .style(button::danger),
    ]
    .spacing(2)
    .align_y(Alignment::Center);

    let bar = container(
        row![
            text(TITLE).size(14),
            horizontal_space(),
            container(controls)
                .width(CONTROLS_WIDTH)
                .align_x(alignment::Horizontal::Right),
        ]
        .align_y(Alignment::Center),
    )
    .padding([0, 12])
    .height(HEADER_HEIGHT)
    .width(Length::Fill)
    .align_y(alignment::Vertical::Center)
    .style(container::dark);

    mouse_area(bar)
        .on_press(Message::HeaderPressed)
        .interaction(if dragging {
            mouse::Interaction::Grabbing
        } else {
            mouse::Interaction::Grab
        })
        .into()
}

fn welcome() -> Element<'static, Message> {
    container(
        column![
            text(format!("Welcome to {}", TITLE)).size(28),
            text("Start a conversation by typing a message below or attaching a file.").size(15),
        ]
        .spacing(8)
        .align_x(alignment::Horizontal::Center),
    )
    .width(Length::Fill)
    .padding([80, 0])
    .align_x(alignment::Horizontal::Center)
    .into()
}

fn bubble<'a>(content: Element<'a, Message>, role: Role) -> Element<'a, Message> {
    let body = container(content)
        .padding(14)
        .max_width(BUBBLE_MAX_WIDTH)
        .style(move |theme: &Theme| {
            let palette = theme.extended_palette();
            let pair = match role {
                Role::User => palette.primary.weak,
                Role::Model => palette.background.weak,
            };
            container::Style {
                background: Some(pair.color.into()),
                text_color: Some(pair.text),
                border: border::rounded(14.0),
                ..container::Style::default()
            }
        });

    let (avatar, align) = match role {
        Role::User => ("U", alignment::Horizontal::Right),
        Role::Model => ("✦", alignment::Horizontal::Left),
    };
    let avatar = container(text(avatar).size(14))
        .padding([6, 10])
        .style(container::rounded_box);

    let line = match role {
        Role::User => row![body, avatar],
        Role::Model => row![avatar, body],
    }
    .spacing(10)
    .align_y(Alignment::Start);

    container(line).width(Length::Fill).align_x(align).into()
}

fn turn_view<'a>(turn: &'a Turn, previews: &'a Previews) -> Element<'a, Message> {
    let parts = turn.parts().iter().enumerate().filter_map(|(index, part)| {
        match part {
            ContentPart::Text(value) => Some(text(value.as_str()).size(15).into()),
            ContentPart::InlineData(_) => previews
                .get(&(turn.id().to_string(), index))
                .map(|handle| {
                    container(iced::widget::image(handle.clone()))
                        .max_width(PREVIEW_MAX_WIDTH)
                        .into()
                }),
        }
    });

    bubble(column(parts).spacing(8).into(), turn.role())
}

fn loading_bubble(frame: usize) -> Element<'static, Message> {
    let spinner = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];
    bubble(
        row![text(spinner).size(18), text("Thinking...").size(15)]
            .spacing(8)
            .align_y(Alignment::Center)
            .into(),
        Role::Model,
    )
}

pub fn transcript<'a>(
    session: &'a Session,
    previews: &'a Previews,
    loading_frame: usize,
    id: scrollable::Id,
) -> Element<'a, Message> {
    let conversation = session.conversation();

    let mut items = column![].spacing(16).padding(16);
    if conversation.is_empty() && !session.is_loading() {
        items = items.push(welcome());
    }
    for turn in conversation.turns() {
        items = items.push(turn_view(turn, previews));
    }
    if session.is_loading() {
        items = items.push(loading_bubble(loading_frame));
    }
    if let Some(message) = session.banner() {
        items = items.push(
            container(
                row![
                    text(message).style(text::danger).size(14),
                    button(text("✕").size(12))
                        .on_press(Message::DismissBanner)
                        .style(button::text),
                ]
                .spacing(8)
                .align_y(Alignment::Center),
            )
            .width(Length::Fill)
            .align_x(alignment::Horizontal::Center),
        );
    }

    scrollable(items)
        .id(id)
        .height(Length::Fill)
        .width(Length::Fill)
        .into()
}

pub fn composer_bar<'a>(
    editor: &'a text_editor::Content,
    composer: &'a Composer,
    loading: bool,
) -> Element<'a, Message> {
    let mut input = text_editor(editor)
        .placeholder("Type your message or attach a file...")
        .padding(10)
        .size(15)
        .height(Length::Shrink)
        .key_binding(|key_press| {
            match composer::key_action(&key_press.key, key_press.modifiers) {
                KeyAction::Submit => Some(text_editor::Binding::Custom(Message::Submit)),
                KeyAction::Default => text_editor::Binding::from_key_press(key_press),
            }
        });
    if !loading {
        input = input.on_action(Message::EditorAction);
    }

    let send_label = if loading {
        SPINNER_FRAMES[0]
    } else {
        "➤"
    };
    let send = button(text(send_label).size(18))
        .padding([8, 14])
        .on_press_maybe(composer.can_submit(loading).then_some(Message::Submit));

    let attach = button(text("📎").size(18))
        .padding([8, 10])
        .style(button::text)
        .on_press(Message::PickFile);

    let mut bar = column![].spacing(8).padding(12);

    if let Some(file) = composer.attachment() {
        bar = bar.push(
            container(
                row![
                    text(format!(
                        "{} Attached: {}",
                        if file.is_image() { "🖼" } else { "📄" },
                        file.name
                    ))
                    .size(13),
                    horizontal_space(),
                    button(text("✕").size(12))
                        .on_press(Message::RemoveAttachment)
                        .style(button::text),
                ]
                .align_y(Alignment::Center),
            )
            .padding([4, 10])
            .style(container::rounded_box),
        );
    }

    bar = bar.push(
        row![
            attach,
            container(input).max_height(192.0).width(Length::Fill),
            send
        ]
        .spacing(8)
        .align_y(Alignment::End),
    );

    container(bar).width(Length::Fill).style(container::dark).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;

    #[test]
    fn test_header_hit_target() {
        assert_eq!(header_hit_target(Point::new(20.0, 10.0), 800.0), HitTarget::Header);
        assert_eq!(header_hit_target(Point::new(700.0, 10.0), 800.0), HitTarget::Control);
        assert_eq!(header_hit_target(Point::new(700.0, 300.0), 800.0), HitTarget::Header);
    }

    #[test]
    fn test_only_image_parts_get_previews() {
        let mut conversation = Conversation::default();
        let turn = conversation
            .append(
                Role::User,
                vec![
                    ContentPart::inline("image/png", "iVBORw0KGgo="),
                    ContentPart::inline("application/pdf", "JVBERi0="),
                    ContentPart::inline("image/png", "not base64!"),
                    ContentPart::text("caption"),
                ],
            )
            .unwrap();

        let previews = image_previews(turn);
        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].0, 0);
    }
}
