use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Duration;
use clap::Parser;
use log::{error, info, warn};
use portfolio_api::cache::FeedCache;
use portfolio_api::database::ContactStore;
use portfolio_api::mailer::{Notifier, SmtpNotifier};
use portfolio_api::medium::HttpFeedSource;
use portfolio_api::{configure, AppState, Args};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let address = format!("{}:{}", args.ip, args.port);

    let contacts = ContactStore::open(&args.db_path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Database initialization failed")
    })?;

    let notifier: Option<Box<dyn Notifier>> = if args.disable_email {
        warn!("Email notifications disabled, contacts are only stored");
        None
    } else {
        Some(Box::new(SmtpNotifier::new(args.smtp_settings())))
    };

    let feed = FeedCache::new(
        Box::new(HttpFeedSource::new(args.feed_url.clone())),
        Duration::seconds(args.cache_lifetime.into()),
        args.limit.into(),
        args.profile_url.clone(),
    );

    let app_state = web::Data::new(AppState {
        config: args,
        feed,
        contacts: contacts.clone(),
        notifier,
    });

    info!("Server running at http://{}", address);
    let res = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind(&address)?
    .run()
    .await;

    let _ = contacts.close().await;
    res
}
