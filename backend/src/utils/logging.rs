use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guestbook=info,tower_http=debug,guestbook_watcher=debug,guestbook_cli=info,server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
