#![windows_subsystem = "windows"]

mod chart;
mod context;
mod emoncms;
mod loader;
mod page;
mod persistence;
mod preferences;
mod sample;
mod settings;
mod store;
pub mod theme;
mod ui;
mod window;

use tracing_subscriber::EnvFilter;
use ui::EmonView;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("emonview=info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting emonview");

    iced::application(EmonView::title, EmonView::update, EmonView::view)
        .subscription(EmonView::subscription)
        .theme(EmonView::theme)
        .window(iced::window::Settings {
            size: (1100.0, 760.0).into(),
            min_size: Some((720.0, 520.0).into()),
            exit_on_close_request: false,
            #[cfg(target_os = "linux")]
            platform_specific: iced::window::settings::PlatformSpecific {
                application_id: String::from("emonview"),
                ..Default::default()
            },
            ..Default::default()
        })
        .run_with(EmonView::new)
}
