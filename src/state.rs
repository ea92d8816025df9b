use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::email::{LettreMailer, Mailer};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;
        let mailer = Arc::new(LettreMailer::new(&config.email)?) as Arc<dyn Mailer>;

        Ok(Self {
            db,
            config,
            users,
            mailer,
        })
    }

    /// State backed by an in-memory user store and a recording mailer. The
    /// pool is lazy and never connects unless a review route is hit.
    #[cfg(test)]
    pub fn fake() -> (Self, Arc<crate::users::memory::MemoryUserStore>, Arc<crate::email::testing::RecordingMailer>) {
        Self::fake_with(AppConfig::test_default(), crate::email::testing::RecordingMailer::default())
    }

    #[cfg(test)]
    pub fn fake_with(
        config: AppConfig,
        mailer: crate::email::testing::RecordingMailer,
    ) -> (Self, Arc<crate::users::memory::MemoryUserStore>, Arc<crate::email::testing::RecordingMailer>) {
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");
        let store = Arc::new(crate::users::memory::MemoryUserStore::new());
        let mailer = Arc::new(mailer);
        let state = Self {
            db,
            config: Arc::new(config),
            users: store.clone() as Arc<dyn UserStore>,
            mailer: mailer.clone() as Arc<dyn Mailer>,
        };
        (state, store, mailer)
    }
}
