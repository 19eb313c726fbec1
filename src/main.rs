mod composer;
mod config;
mod conversation;
mod gemini;
mod geometry;
mod session;
mod view;

use iced::{
    event::{self, Event as IcedEvent},
    mouse, time,
    widget::{column, scrollable, text_editor},
    window::{self, Level},
    Element, Point, Size, Subscription, Task, Theme,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::composer::{Attachment, Composer};
use crate::config::Config;
use crate::gemini::{GeminiClient, Reply, Responder};
use crate::geometry::GeometryController;
use crate::session::Session;

fn init_logging() {
    let filter = if std::env::var_os("PEXI_DEBUG").is_some() {
        EnvFilter::new("pexi=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> iced::Result {
    init_logging();

    let config = Config::load();
    let geometry = GeometryController::new(viewport(&config), config.window.clone());
    let initial = geometry.geometry();

    iced::application(view::TITLE, App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: initial.size,
            position: window::Position::Specific(initial.position),
            min_size: Some(geometry.min_size()),
            decorations: false,
            level: Level::AlwaysOnTop,
            ..Default::default()
        })
        .run_with(move || App::new(&config, geometry.clone()))
}

fn viewport(config: &Config) -> Size {
    Size::new(config.display.width, config.display.height)
}

#[derive(Debug, Clone)]
enum Message {
    WindowFound(Option<window::Id>),
    HeaderPressed,
    CursorMoved(Point),
    PointerReleased,
    Resized(Size),
    Moved(Point),
    Reset,
    Minimize,
    ToggleMaximize,
    Close,
    EditorAction(text_editor::Action),
    Submit,
    PickFile,
    AttachmentPicked(Option<Result<Attachment, String>>),
    RemoveAttachment,
    ResponseReceived(Reply),
    DismissBanner,
    Tick,
}

struct App {
    geometry: GeometryController,
    composer: Composer,
    editor: text_editor::Content,
    session: Session,
    responder: Responder,
    previews: view::Previews,
    window_id: Option<window::Id>,
    /// Last cursor position, relative to the window.
    cursor: Point,
    /// Last origin reported by the OS. Lags behind `geometry` during a drag,
    /// and it is what `cursor` is relative to.
    window_origin: Point,
    loading_frame: usize,
    transcript_id: scrollable::Id,
}

async fn pick_attachment() -> Option<Result<Attachment, String>> {
    let handle = rfd::AsyncFileDialog::new()
        .set_title("Attach a file")
        .add_filter("Images, text, PDF, CSV", composer::ACCEPTED_EXTENSIONS)
        .add_filter("All files", &["*"])
        .pick_file()
        .await?;

    let path: PathBuf = handle.path().to_path_buf();
    Some(
        composer::read_attachment(path)
            .await
            .map_err(|e| format!("{:#}", e)),
    )
}

impl App {
    fn new(config: &Config, geometry: GeometryController) -> (Self, Task<Message>) {
        let client = GeminiClient::with_config(&config.model);
        let responder = Responder::new(config.model.model.clone(), Arc::new(client));
        info!(model = %responder.get_model(), "starting");

        (
            App::with_responder(geometry, responder),
            window::get_latest().map(Message::WindowFound),
        )
    }

    fn with_responder(geometry: GeometryController, responder: Responder) -> Self {
        App {
            window_origin: geometry.position(),
            geometry,
            composer: Composer::new(),
            editor: text_editor::Content::new(),
            session: Session::new(),
            responder,
            previews: view::Previews::new(),
            window_id: None,
            cursor: Point::ORIGIN,
            loading_frame: 0,
            transcript_id: scrollable::Id::unique(),
        }
    }

    /// Cursor in screen coordinates. Several cursor events can arrive before
    /// the OS applies a commanded move, so this must use the reported origin.
    fn pointer(&self) -> Point {
        Point::new(
            self.window_origin.x + self.cursor.x,
            self.window_origin.y + self.cursor.y,
        )
    }

    fn scroll_to_end(&self) -> Task<Message> {
        scrollable::snap_to(self.transcript_id.clone(), scrollable::RelativeOffset::END)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::WindowFound(id) => {
                if id.is_some() {
                    self.window_id = id;
                }
                Task::none()
            }
            Message::HeaderPressed => {
                let target = view::header_hit_target(self.cursor, self.geometry.size().width);
                let origin = self.geometry.position();
                self.geometry.begin_drag(self.pointer(), origin, target);
                Task::none()
            }
            Message::CursorMoved(position) => {
                self.cursor = position;
                let pointer = self.pointer();
                match (self.window_id, self.geometry.on_pointer_move(pointer)) {
                    (Some(id), Some(position)) => window::move_to(id, position),
                    _ => Task::none(),
                }
            }
            Message::PointerReleased => {
                self.geometry.end_drag();
                Task::none()
            }
            Message::Resized(size) => {
                if self.geometry.on_external_resize(size.width, size.height) {
                    debug!(?size, "window resized");
                }
                Task::none()
            }
            Message::Moved(position) => {
                self.window_origin = position;
                self.geometry.on_external_move(position);
                Task::none()
            }
            Message::Reset => {
                let geometry = self.geometry.reset();
                match self.window_id {
                    Some(id) => Task::batch([
                        window::resize(id, geometry.size),
                        window::move_to(id, geometry.position),
                    ]),
                    None => Task::none(),
                }
            }
            Message::Minimize => match self.window_id {
                Some(id) => window::minimize(id, true),
                None => Task::none(),
            },
            Message::ToggleMaximize => match self.window_id {
                Some(id) => window::toggle_maximize(id),
                None => Task::none(),
            },
            Message::Close => iced::exit(),
            Message::EditorAction(action) => {
                self.editor.perform(action);
                self.composer.set_text(self.editor.text());
                Task::none()
            }
            Message::Submit => {
                let Some(parts) = self.composer.submit(self.session.is_loading()) else {
                    return Task::none();
                };
                self.editor = text_editor::Content::new();

                let Some(exchange) = self.session.submit(parts) else {
                    return Task::none();
                };
                if let Some(turn) = self.session.conversation().turns().last() {
                    for (index, handle) in view::image_previews(turn) {
                        self.previews.insert((turn.id().to_string(), index), handle);
                    }
                }

                let responder = self.responder.clone();
                let request = Task::future(async move {
                    let reply = responder.generate(exchange.history, exchange.parts).await;
                    Message::ResponseReceived(reply)
                });

                Task::batch([request, self.scroll_to_end()])
            }
            Message::ResponseReceived(reply) => {
                self.session.settle(reply);
                self.scroll_to_end()
            }
            Message::PickFile => Task::future(pick_attachment()).map(Message::AttachmentPicked),
            Message::AttachmentPicked(picked) => {
                match picked {
                    Some(Ok(file)) => self.composer.attach(file),
                    Some(Err(e)) => {
                        warn!("Could not attach file: {}", e);
                        self.session.show_banner(format!("Could not attach file: {}", e));
                    }
                    None => {}
                }
                Task::none()
            }
            Message::RemoveAttachment => {
                self.composer.remove_attachment();
                Task::none()
            }
            Message::DismissBanner => {
                self.session.dismiss_banner();
                Task::none()
            }
            Message::Tick => {
                if self.session.is_loading() {
                    self.loading_frame = self.loading_frame.wrapping_add(1);
                }
                Task::none()
            }
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let timer = if self.session.is_loading() {
            time::every(Duration::from_millis(80)).map(|_| Message::Tick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, id| match event {
            IcedEvent::Mouse(mouse::Event::CursorMoved { position }) => {
                Some(Message::CursorMoved(position))
            }
            IcedEvent::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                Some(Message::PointerReleased)
            }
            IcedEvent::Window(window::Event::Opened { .. }) => Some(Message::WindowFound(Some(id))),
            IcedEvent::Window(window::Event::Resized(size)) => Some(Message::Resized(size)),
            IcedEvent::Window(window::Event::Moved(position)) => Some(Message::Moved(position)),
            _ => None,
        });

        Subscription::batch([timer, events])
    }

    fn view(&self) -> Element<'_, Message> {
        let loading = self.session.is_loading();

        column![
            view::header(self.geometry.is_dragging()),
            view::transcript(
                &self.session,
                &self.previews,
                self.loading_frame,
                self.transcript_id.clone()
            ),
            view::composer_bar(&self.editor, &self.composer, loading),
        ]
        .into()
    }

    fn theme(&self) -> Theme {
        Theme::TokyoNight
    }
}
