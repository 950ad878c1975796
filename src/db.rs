use mongodb::{
    Client, ClientSession, Collection,
    bson::{Document, doc},
    options::ClientOptions,
};

use crate::event::EventListing;

pub mod constants {
    use core::time::Duration;

    macro_rules! env_or_default {
        ($name:expr, $default:expr) => {
            if let Some(s) = option_env!($name) {
                s
            } else {
                $default
            }
        };
    }

    pub const HOST: &str = env_or_default!("MONGO_HOST", "hackathondb.hwg5w.mongodb.net");
    pub const APP_NAME: &str = env_or_default!("MONGO_APP_NAME", "hackathondb");
    pub const DBNAME: &str = env_or_default!("MONGO_DB", "hackathonDB");
    pub const COLLECTION: &str = env_or_default!("MONGO_COLLECTION", "events");
    pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Builds the `mongodb+srv` connection string.
///
/// Both credentials are percent-escaped; empty ones are accepted here and
/// only fail once the server rejects them.
pub fn connection_uri(user: &str, password: &str, host: &str) -> String {
    format!(
        "mongodb+srv://{}:{}@{host}/?retryWrites=true&w=majority&appName={}",
        urlencoding::encode(user),
        urlencoding::encode(password),
        constants::APP_NAME,
    )
}

/// Destination of a collector run.
pub trait Store {
    /// Removes every stored listing, returning how many were dropped.
    async fn clear(&self) -> anyhow::Result<u64>;

    /// Swaps the stored listings for `records` in one step, returning how many
    /// were dropped. `records` is never empty.
    async fn replace_all(&self, records: &[EventListing]) -> anyhow::Result<u64>;
}

/// Replaces the whole collection with `records`.
///
/// An empty batch still clears the collection but never issues an insert.
pub async fn publish<S: Store>(store: &S, records: &[EventListing]) -> anyhow::Result<usize> {
    if records.is_empty() {
        let deleted = store.clear().await?;
        tracing::warn!(target: "db", "nothing scraped, cleared {deleted} stale listings");
        return Ok(0);
    }

    let deleted = store.replace_all(records).await?;
    tracing::info!(
        target: "db",
        "\x1b[36mreplaced {deleted} listings with {} new ones\x1b[0m",
        records.len(),
    );
    Ok(records.len())
}

pub struct MongoStore {
    client: Client,
    events: Collection<EventListing>,
    transactional: bool,
}

impl MongoStore {
    /// Connects and pings the deployment so bad credentials surface before any scraping.
    pub async fn connect(uri: &str, transactional: bool) -> anyhow::Result<Self> {
        use anyhow::Context;
        use constants::{COLLECTION, CONNECTION_TIMEOUT, DBNAME};

        let mut options = ClientOptions::parse(uri)
            .await
            .context("invalid connection string")?;
        options.connect_timeout = Some(CONNECTION_TIMEOUT);
        options.server_selection_timeout = Some(CONNECTION_TIMEOUT);

        let client = Client::with_options(options)?;
        let db = client.database(DBNAME);
        db.run_command(doc! { "ping": 1 })
            .await
            .context("cannot reach the document store")?;
        tracing::info!(target: "db", "connected to {DBNAME}.{COLLECTION}");

        Ok(Self {
            events: db.collection(COLLECTION),
            client,
            transactional,
        })
    }

    async fn swap(&self, session: &mut ClientSession, records: &[EventListing]) -> mongodb::error::Result<u64> {
        let deleted = self
            .events
            .delete_many(Document::new())
            .session(&mut *session)
            .await?
            .deleted_count;
        self.events.insert_many(records).session(&mut *session).await?;
        Ok(deleted)
    }
}

impl Store for MongoStore {
    async fn clear(&self) -> anyhow::Result<u64> {
        Ok(self.events.delete_many(Document::new()).await?.deleted_count)
    }

    async fn replace_all(&self, records: &[EventListing]) -> anyhow::Result<u64> {
        if !self.transactional {
            let deleted = self.clear().await?;
            self.events.insert_many(records).await?;
            return Ok(deleted);
        }

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        match self.swap(&mut session, records).await {
            Ok(deleted) => {
                session.commit_transaction().await?;
                Ok(deleted)
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    tracing::error!(target: "db", "\x1b[31mabort failed: {abort}\x1b[0m");
                }
                Err(e.into())
            }
        }
    }
}
