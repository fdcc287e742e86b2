use actix_web::{http::header, route, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::warn;
use serde_json::json;
use std::time::SystemTime;

pub mod cache;
pub mod contact;
pub mod database;
pub mod mailer;
pub mod medium;

use cache::FeedCache;
use contact::{submit, ContactError, ContactPayload};
use database::ContactStore;
use mailer::{Notifier, SmtpSettings};

#[derive(Parser, Debug, Clone)]
#[clap(about, version)]
pub struct Args {
    #[clap(short, long, env = "BIND_IP", default_value = "127.0.0.1")]
    pub ip: String,

    #[clap(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    #[clap(short, long, env = "FEED_LIMIT", default_value = "3")]
    pub limit: u16,

    /// Seconds a fetched feed is served before the next request refreshes it.
    #[clap(short, long, env = "FEED_CACHE_LIFETIME", default_value = "1800")]
    pub cache_lifetime: u32,

    #[clap(short, long, env = "DATABASE_PATH", default_value = "data.sqlite")]
    pub db_path: String,

    #[clap(
        long,
        env = "MEDIUM_FEED_URL",
        default_value = "https://medium.com/feed/@arun.bhisne"
    )]
    pub feed_url: String,

    /// Used as the post link when a feed item has none.
    #[clap(
        long,
        env = "MEDIUM_PROFILE_URL",
        default_value = "https://medium.com/@arun.bhisne"
    )]
    pub profile_url: String,

    /// Address shown to visitors when the notification email fails.
    #[clap(long, env = "CONTACT_EMAIL", default_value = "arun.bhisne@example.com")]
    pub contact_email: String,

    #[clap(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[clap(long, env = "SMTP_PORT", default_value = "587")]
    pub smtp_port: u16,

    #[clap(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[clap(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    #[clap(long, env = "CONTACT_TO_EMAIL")]
    pub contact_to: Option<String>,

    #[clap(long, env = "CONTACT_FROM_EMAIL")]
    pub contact_from: Option<String>,

    /// Store contact submissions without emailing them.
    #[clap(long, env = "DISABLE_EMAIL")]
    pub disable_email: bool,
}

impl Args {
    pub fn smtp_settings(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            user: self.smtp_user.clone(),
            password: self.smtp_password.clone(),
            recipient: self.contact_to.clone(),
            sender: self.contact_from.clone(),
        }
    }
}

pub struct AppState {
    pub config: Args,
    pub feed: FeedCache,
    pub contacts: ContactStore,
    pub notifier: Option<Box<dyn Notifier>>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(medium_posts).service(contact_form);
}

#[route("/api/medium-posts", method = "GET", method = "HEAD")]
async fn medium_posts(app_data: web::Data<AppState>) -> impl Responder {
    let snapshot = app_data.feed.get_posts().await;

    let mut response = HttpResponse::Ok();
    if let Some(refreshed_at) = snapshot.refreshed_at {
        response.insert_header((header::LAST_MODIFIED, last_modified(refreshed_at)));
    }
    response.json(snapshot.posts)
}

fn last_modified(at: DateTime<Utc>) -> String {
    let secs = at.timestamp().max(0) as u64;
    header::HttpDate::from(SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs))
        .to_string()
}

#[route("/api/contact", method = "POST")]
async fn contact_form(app_data: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let payload: ContactPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(err) => {
            warn!("Rejected contact body: {}", err);
            return HttpResponse::BadRequest().json(json!({ "error": "Invalid JSON body" }));
        }
    };

    match submit(&app_data.contacts, app_data.notifier.as_deref(), payload).await {
        Ok(id) => HttpResponse::Ok().json(json!({ "success": true, "id": id })),
        Err(ContactError::Validation(err)) => {
            HttpResponse::BadRequest().json(json!({ "error": err.to_string() }))
        }
        Err(ContactError::Storage(_)) => {
            HttpResponse::InternalServerError().json(json!({ "error": "Failed to save message" }))
        }
        Err(ContactError::Notification { .. }) => {
            HttpResponse::InternalServerError().json(json!({
                "error": format!(
                    "Your message was saved but the notification failed. Please email {} directly.",
                    app_data.config.contact_email
                )
            }))
        }
    }
}
