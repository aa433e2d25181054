use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use crate::config::{get_database_path, load_config, save_config, ContactGraphConfig};
use crate::db::Database;
use crate::errors::{ContactGraphError, Result};
use crate::redact::fingerprint_opt;
use crate::resolution::IdentityResolver;
use crate::types::*;
use crate::validation::validate_identify_request;

/// Owns the store handle and configuration, and fronts the resolver with
/// request validation and logging.
///
/// The database connection is opened by [`ContactGraph::init`] or
/// [`ContactGraph::open`] and released by [`ContactGraph::close`].
pub struct ContactGraph {
    db: Database,
    config: ContactGraphConfig,
    root: PathBuf,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

impl ContactGraph {
    /// Initializes a new deployment under `root`.
    ///
    /// Writes the configuration (keeping an existing one) and creates or
    /// upgrades the database.
    pub fn init(root: &Path) -> Result<Self> {
        let config = ContactGraphConfig {
            root_dir: root.to_string_lossy().to_string(),
            ..load_config(root)?
        };
        save_config(root, &config)?;

        let db = Database::initialize(&get_database_path(root, &config))?;
        db.set_busy_timeout(config.busy_timeout_ms)?;

        info!(root = %root.display(), "initialized contact graph");
        Ok(Self {
            db,
            config,
            root: root.to_path_buf(),
        })
    }

    /// Opens an existing deployment under `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let config = load_config(root)?;
        let db_path = get_database_path(root, &config);

        if !db_path.exists() {
            return Err(ContactGraphError::Config {
                message: format!(
                    "no contact database found at '{}'; run 'contactgraph init' first",
                    db_path.display()
                ),
            });
        }

        let db = Database::open(&db_path)?;
        db.set_busy_timeout(config.busy_timeout_ms)?;
        Ok(Self {
            db,
            config,
            root: root.to_path_buf(),
        })
    }

    /// Creates a throwaway deployment backed by an in-memory database.
    pub fn in_memory(config: ContactGraphConfig) -> Result<Self> {
        let db = Database::open_in_memory()?;
        let root = PathBuf::from(&config.root_dir);
        Ok(Self { db, config, root })
    }

    /// Returns `true` if a database exists under `root`.
    pub fn is_initialized(root: &Path) -> bool {
        load_config(root)
            .map(|config| get_database_path(root, &config).exists())
            .unwrap_or(false)
    }

    /// Closes the database connection.
    pub fn close(self) -> Result<()> {
        self.db.close()?;
        info!("database connection closed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identity operations
// ---------------------------------------------------------------------------

impl ContactGraph {
    /// Validates `request` and reconciles it into the graph.
    pub fn identify(&self, request: &IdentifyRequest) -> Result<ConsolidatedContact> {
        validate_identify_request(request)?;

        let start = Instant::now();
        info!(
            email = %fingerprint_opt(request.email()),
            phone = %fingerprint_opt(request.phone_number()),
            "identify request received"
        );

        let resolver = IdentityResolver::new(&self.db);
        let consolidated = resolver.identify(request.email(), request.phone_number())?;

        info!(
            primary_contact_id = consolidated.primary_contact_id,
            email_count = consolidated.emails.len(),
            phone_count = consolidated.phone_numbers.len(),
            secondary_count = consolidated.secondary_contact_ids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "identify request completed"
        );
        Ok(consolidated)
    }

    /// Returns the consolidated view of the cluster containing `contact_id`.
    pub fn lookup(&self, contact_id: i64) -> Result<ConsolidatedContact> {
        IdentityResolver::new(&self.db).lookup(contact_id)
    }

    /// Retrieves a single live contact row.
    pub fn get_contact(&self, contact_id: i64) -> Result<Option<Contact>> {
        self.db.get_contact_by_id(contact_id)
    }

    /// Soft-deletes a contact.
    pub fn delete_contact(&self, contact_id: i64) -> Result<()> {
        self.db.soft_delete_contact(contact_id)?;
        info!(contact_id, "contact soft-deleted");
        Ok(())
    }

    /// Returns aggregate statistics about the store.
    pub fn get_stats(&self) -> Result<GraphStats> {
        self.db.get_stats()
    }

    /// Returns the underlying store handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Returns a reference to the current configuration.
    pub fn get_config(&self) -> &ContactGraphConfig {
        &self.config
    }

    /// Returns the deployment root path.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
