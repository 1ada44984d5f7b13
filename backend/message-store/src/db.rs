use crate::config::Config;
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig};
use sqlx::{Pool, Postgres};

pub async fn init_pool(config: &Config) -> Result<Pool<Postgres>, sqlx::Error> {
    let cfg = DbPoolConfig::with_url("message-store", config.database_url.clone());
    cfg.log_config();
    create_pg_pool(cfg).await
}
