//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Registrants**: profile, password hash and payment ledger per user,
//!   with an email index that enforces uniqueness.
//! - **Orders and checkouts**: gateway orders the service created, with the
//!   selection each was priced from.
//! - **OTPs and download tokens**: short-lived, in memory only, with a
//!   per-address issuance budget.
//! - **Download files and the allow-list**: persisted, mirrored here.
//! - **Abstracts, papers and invitation requests**: persisted, mirrored here.
//!   A paper shares its abstract's code.
//! - **Collaborators**: payment gateways, mailer, spreadsheet sink, file
//!   storage and the side-effect queue.
//!
//! Every mutation decides under the store's write lock. When a database pool
//! is present, writes go through to Postgres and the stores are hydrated from
//! it on startup.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use confreg_core::{
    AbstractSubmission, AllowList, CategorySelection, DownloadFile, DownloadToken, FeeQuote,
    FileType, InvitationRequest, OrderRecord, OtpRecord, Paper, Registrant,
};
use confreg_gateway::phonepe::PhonePeClient;
use confreg_gateway::{GatewayClient, GatewayError};
use parking_lot::RwLock;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::effects::EffectQueue;
use crate::mailer::{MailError, Mailer};
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::sheets::{SheetSink, SheetsError};
use crate::storage::DiskStorage;

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// The lock is `parking_lot` and is never held across an `.await`.
#[derive(Debug)]
pub struct Store<K, V> {
    data: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Store<K, V> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.data.write().insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.data.read().get(key).cloned()
    }

    pub fn list(&self) -> Vec<V> {
        self.data.read().values().cloned().collect()
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, key: &K, f: impl FnOnce(&mut V)) -> Option<V> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(key)?;
        f(entry);
        Some(entry.clone())
    }

    /// Atomically read-validate-update a record.
    ///
    /// The whole closure runs under one write lock. Returns `None` if the
    /// record doesn't exist.
    pub fn try_update<R, E>(
        &self,
        key: &K,
        f: impl FnOnce(&mut V) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(key).map(f)
    }

    /// Run `f` on the slot for `key` under the write lock. Setting the slot
    /// to `None` removes the entry; setting it to `Some` inserts or replaces.
    pub fn with_entry<R>(&self, key: &K, f: impl FnOnce(&mut Option<V>) -> R) -> R {
        let mut guard = self.data.write();
        let mut slot = guard.remove(key);
        let result = f(&mut slot);
        if let Some(value) = slot {
            guard.insert(key.clone(), value);
        }
        result
    }

    /// Keep only the entries `f` accepts. Returns how many were dropped.
    pub fn retain(&self, mut f: impl FnMut(&K, &V) -> bool) -> usize {
        let mut guard = self.data.write();
        let before = guard.len();
        guard.retain(|k, v| f(k, v));
        before - guard.len()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.data.write().remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.data.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for Store<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A lazily created single document.
#[derive(Debug)]
pub struct Singleton<T> {
    data: Arc<RwLock<Option<T>>>,
}

impl<T> Clone for Singleton<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone> Singleton<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(None)),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.data.read().clone()
    }

    /// Replace the document.
    pub fn set(&self, value: T) {
        *self.data.write() = Some(value);
    }

    /// Mutate the document under the write lock, creating it with `init`
    /// first if it does not exist yet.
    pub fn update<R>(&self, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.data.write();
        let doc = guard.get_or_insert_with(init);
        f(doc)
    }
}

impl<T: Clone> Default for Singleton<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Records ------------------------------------------------------------------

/// What a gateway order was priced from. Kept so the confirmation can be
/// checked against the server's own numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub user_id: Uuid,
    pub email: String,
    pub selection: Vec<CategorySelection>,
    pub quote: FeeQuote,
}

/// Collaborators that failed to initialise.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("payment gateway client: {0}")]
    Gateway(#[from] GatewayError),

    #[error("mailer: {0}")]
    Mail(#[from] MailError),

    #[error("spreadsheet sink: {0}")]
    Sheets(#[from] SheetsError),
}

// -- AppState -----------------------------------------------------------------

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub users: Store<Uuid, Registrant>,
    /// Normalized email to uid. Holding the write lock on this index is how
    /// concurrent registrations with one email are serialised.
    pub user_emails: Store<String, Uuid>,
    /// Keyed by provider order id or PhonePe merchant transaction id.
    pub orders: Store<String, OrderRecord>,
    pub checkouts: Store<String, Checkout>,
    /// Outstanding one-time codes, one per normalized email.
    pub otps: Store<String, OtpRecord>,
    /// When a swept code for this email expired. Lets verification report
    /// expiry rather than absence after the sweeper has run.
    pub expired_otps: Store<String, DateTime<Utc>>,
    /// Code issuance budget per recipient address.
    pub otp_limiter: RateLimiter,
    /// Keyed by the token value.
    pub download_tokens: Store<String, DownloadToken>,
    pub download_files: Store<FileType, DownloadFile>,
    pub allow_list: Singleton<AllowList>,
    /// Outstanding password-reset codes, one per normalized email.
    pub password_resets: Store<String, OtpRecord>,
    /// Keyed by abstract code.
    pub abstracts: Store<String, AbstractSubmission>,
    /// Keyed by paper code, which is the abstract code.
    pub papers: Store<String, Paper>,
    pub invitations: Store<Uuid, InvitationRequest>,

    /// When `Some`, writes go through to Postgres as well.
    pub db_pool: Option<PgPool>,

    pub gateway: Option<GatewayClient>,
    pub phonepe: Option<PhonePeClient>,
    pub mailer: Mailer,
    pub sheets: SheetSink,
    pub effects: EffectQueue,
    pub storage: DiskStorage,

    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration and outbox collaborators.
    pub fn new() -> Self {
        let config = AppConfig::default();
        let mailer = Mailer::outbox();
        let sheets = SheetSink::outbox();
        Self::assemble(config, None, None, mailer, sheets)
    }

    /// Build state from configuration, constructing every configured client.
    pub fn with_config(config: AppConfig) -> Result<Self, StateError> {
        let gateway = config.gateway.clone().map(GatewayClient::new).transpose()?;
        let phonepe = config.phonepe.clone().map(PhonePeClient::new).transpose()?;
        let mailer = Mailer::from_config(config.smtp.as_ref())?;
        let sheets = SheetSink::from_config(config.sheets.as_ref())?;
        if gateway.is_none() {
            tracing::warn!("payment gateway not configured: order creation is disabled");
        }
        Ok(Self::assemble(config, gateway, phonepe, mailer, sheets))
    }

    fn assemble(
        config: AppConfig,
        gateway: Option<GatewayClient>,
        phonepe: Option<PhonePeClient>,
        mailer: Mailer,
        sheets: SheetSink,
    ) -> Self {
        let effects = EffectQueue::start(mailer.clone(), sheets.clone());
        Self {
            users: Store::new(),
            user_emails: Store::new(),
            orders: Store::new(),
            checkouts: Store::new(),
            otps: Store::new(),
            expired_otps: Store::new(),
            otp_limiter: RateLimiter::new(RateLimitConfig::default()),
            download_tokens: Store::new(),
            download_files: Store::new(),
            allow_list: Singleton::new(),
            password_resets: Store::new(),
            abstracts: Store::new(),
            papers: Store::new(),
            invitations: Store::new(),
            db_pool: None,
            gateway,
            phonepe,
            mailer,
            sheets,
            effects,
            storage: DiskStorage::new(config.downloads_dir.clone()),
            config,
        }
    }

    /// Attach a database pool.
    pub fn with_db_pool(mut self, pool: Option<PgPool>) -> Self {
        self.db_pool = pool;
        self
    }

    pub fn find_user_by_email(&self, email: &str) -> Option<Registrant> {
        let uid = self.user_emails.get(&email.to_string())?;
        self.users.get(&uid)
    }

    /// Hydrate in-memory stores from the database.
    ///
    /// Called once on startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let registrants = crate::db::users::load_all(pool)
            .await
            .map_err(|e| format!("failed to load registrants: {e}"))?;
        let registrant_count = registrants.len();
        for registrant in registrants {
            self.user_emails.insert(registrant.email.clone(), registrant.uid);
            self.users.insert(registrant.uid, registrant);
        }

        let payments = crate::db::payments::load_all(pool)
            .await
            .map_err(|e| format!("failed to load payments: {e}"))?;
        let mut payment_count = 0usize;
        for (uid, record) in payments {
            let timestamp = record.timestamp;
            let applied = self
                .users
                .update(&uid, |r| {
                    r.payments.record(record);
                    r.updated_at = r.updated_at.max(timestamp);
                })
                .is_some();
            if applied {
                payment_count += 1;
            } else {
                tracing::warn!(user_id = %uid, "payment row references unknown registrant");
            }
        }

        let orders = crate::db::orders::load_all(pool)
            .await
            .map_err(|e| format!("failed to load orders: {e}"))?;
        let order_count = orders.len();
        for order in orders {
            self.orders.insert(order.order_id.clone(), order);
        }

        let files = crate::db::download_files::load_all(pool)
            .await
            .map_err(|e| format!("failed to load download files: {e}"))?;
        let file_count = files.len();
        for file in files {
            self.download_files.insert(file.file_type, file);
        }

        let allow_list = crate::db::allowed_emails::load(pool)
            .await
            .map_err(|e| format!("failed to load allow-list: {e}"))?;
        let allowed_count = allow_list.as_ref().map_or(0, |l| l.emails.len());
        if let Some(list) = allow_list {
            self.allow_list.set(list);
        }

        let abstracts = crate::db::abstracts::load_all(pool)
            .await
            .map_err(|e| format!("failed to load abstracts: {e}"))?;
        let abstract_count = abstracts.len();
        for submission in abstracts {
            self.abstracts.insert(submission.abstract_code.clone(), submission);
        }

        let papers = crate::db::papers::load_all(pool)
            .await
            .map_err(|e| format!("failed to load papers: {e}"))?;
        let paper_count = papers.len();
        for paper in papers {
            self.papers.insert(paper.paper_code.clone(), paper);
        }

        let invitations = crate::db::invitations::load_all(pool)
            .await
            .map_err(|e| format!("failed to load invitation requests: {e}"))?;
        let invitation_count = invitations.len();
        for request in invitations {
            self.invitations.insert(request.user_id, request);
        }

        tracing::info!(
            registrants = registrant_count,
            payments = payment_count,
            orders = order_count,
            download_files = file_count,
            allowed_emails = allowed_count,
            abstracts = abstract_count,
            papers = paper_count,
            invitations = invitation_count,
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
