//! Order and approval-configuration persistence using JSON file storage

use crate::models::approval::{
    ApprovalAuthority, ApprovalStepInstance, ApprovalStepTemplate, ApprovalWorkflowSettings,
    StepStatus, User, UserRole,
};
use crate::models::order::{ApprovalStatus, OrderHistoryRecord, OrderStatus, PurchaseOrder};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Root JSON store containing all order and approval data
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JsonStore {
    /// All purchase orders
    pub orders: Vec<PurchaseOrder>,
    /// Per-role approval authorities
    pub authorities: Vec<ApprovalAuthority>,
    /// Per-company workflow settings
    pub settings: Vec<ApprovalWorkflowSettings>,
    /// Staged approval step templates
    pub templates: Vec<ApprovalStepTemplate>,
    /// Materialized step instances
    pub instances: Vec<ApprovalStepInstance>,
    /// Known users
    pub users: Vec<User>,
    /// Order history log
    pub history: Vec<OrderHistoryRecord>,
}

/// Outcome of the optimistic step update
#[derive(Debug, Clone)]
pub enum StepUpdate {
    /// The step was still pending; the mutation was applied and saved
    Updated(ApprovalStepInstance),
    /// The step had already been decided; nothing changed
    NotPending(StepStatus),
    /// No such step
    Missing,
}

/// Order store manager
pub struct OrderStore {
    /// Path to JSON store file
    store_path: PathBuf,
    /// In-memory data store
    store: Arc<Mutex<JsonStore>>,
}

impl OrderStore {
    /// Create new store manager
    pub fn new<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store_path = store_path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create order store directory")?;
        }

        // Load or initialize store
        let store = if store_path.exists() {
            Self::load_store(&store_path)?
        } else {
            JsonStore::default()
        };

        Ok(Self {
            store_path,
            store: Arc::new(Mutex::new(store)),
        })
    }

    /// Load JSON store from file with file locking
    fn load_store(path: &Path) -> Result<JsonStore> {
        let file = File::open(path).context("Failed to open order store file")?;

        // Acquire shared lock for reading
        file.lock_shared()
            .context("Failed to acquire read lock on order store")?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(file);
        reader
            .read_to_string(&mut contents)
            .context("Failed to read order store")?;

        // Lock released when the reader goes out of scope
        drop(reader);

        if contents.is_empty() {
            return Ok(JsonStore::default());
        }

        serde_json::from_str(&contents).context("Failed to parse order store JSON")
    }

    /// Save JSON store to file with file locking
    fn save_store(&self) -> Result<()> {
        let store = self.store.lock().unwrap();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.store_path)
            .context("Failed to open order store file for writing")?;

        // Acquire exclusive lock for writing
        file.lock_exclusive()
            .context("Failed to acquire write lock on order store")?;

        let json =
            serde_json::to_string_pretty(&*store).context("Failed to serialize order store")?;

        let mut writer = std::io::BufWriter::new(file);
        writer
            .write_all(json.as_bytes())
            .context("Failed to write order store")?;

        writer.flush().context("Failed to flush order store to disk")?;

        Ok(())
    }

    // ---- users ----

    /// Insert or replace a user
    pub fn upsert_user(&self, user: User) -> Result<()> {
        {
            let mut store = self.store.lock().unwrap();
            if let Some(existing) = store.users.iter_mut().find(|u| u.id == user.id) {
                *existing = user;
            } else {
                store.users.push(user);
            }
        }
        self.save_store()
    }

    /// Get user by ID
    pub fn get_user(&self, user_id: Uuid) -> Option<User> {
        let store = self.store.lock().unwrap();
        store.users.iter().find(|u| u.id == user_id).cloned()
    }

    /// First active user holding the given role
    pub fn find_user_by_role(&self, role: UserRole) -> Option<User> {
        let store = self.store.lock().unwrap();
        store
            .users
            .iter()
            .find(|u| u.role == role && u.is_active)
            .cloned()
    }

    // ---- authorities ----

    /// Insert an approval authority row
    pub fn insert_authority(&self, authority: ApprovalAuthority) -> Result<()> {
        {
            let mut store = self.store.lock().unwrap();
            store.authorities.push(authority);
        }
        self.save_store()
    }

    /// Active authority configured for a role
    pub fn authority_for_role(&self, role: UserRole) -> Option<ApprovalAuthority> {
        let store = self.store.lock().unwrap();
        store
            .authorities
            .iter()
            .find(|a| a.role == role && a.is_active)
            .cloned()
    }

    /// Active authorities whose ceiling covers the amount, ascending.
    /// Ties on max_amount break by role name for a deterministic chain.
    pub fn authorities_covering(&self, amount: i64) -> Vec<ApprovalAuthority> {
        let store = self.store.lock().unwrap();
        let mut covering: Vec<_> = store
            .authorities
            .iter()
            .filter(|a| a.is_active && a.max_amount >= amount)
            .cloned()
            .collect();
        covering.sort_by(|a, b| {
            a.max_amount
                .cmp(&b.max_amount)
                .then_with(|| a.role.as_str().cmp(b.role.as_str()))
        });
        covering
    }

    // ---- workflow settings ----

    /// Insert workflow settings for a company
    pub fn insert_settings(&self, settings: ApprovalWorkflowSettings) -> Result<()> {
        {
            let mut store = self.store.lock().unwrap();
            store.settings.push(settings);
        }
        self.save_store()
    }

    /// Latest active settings row for a company
    pub fn active_settings(&self, company_id: i64) -> Option<ApprovalWorkflowSettings> {
        let store = self.store.lock().unwrap();
        store
            .settings
            .iter()
            .filter(|s| s.company_id == company_id && s.is_active)
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    // ---- step templates ----

    /// Insert a step template row
    pub fn insert_template(&self, template: ApprovalStepTemplate) -> Result<()> {
        {
            let mut store = self.store.lock().unwrap();
            store.templates.push(template);
        }
        self.save_store()
    }

    /// Active templates whose amount band covers the amount, ordered by step
    pub fn templates_for_amount(&self, company_id: i64, amount: i64) -> Vec<ApprovalStepTemplate> {
        let store = self.store.lock().unwrap();
        let mut matching: Vec<_> = store
            .templates
            .iter()
            .filter(|t| t.company_id == company_id && t.is_active && t.covers(amount))
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.step_order);
        matching
    }

    // ---- orders ----

    /// Next free order identifier
    pub fn next_order_id(&self) -> i64 {
        let store = self.store.lock().unwrap();
        store.orders.iter().map(|o| o.id).max().unwrap_or(0) + 1
    }

    /// Create a new purchase order
    pub fn create_order(&self, order: PurchaseOrder) -> Result<()> {
        {
            let mut store = self.store.lock().unwrap();
            store.orders.push(order);
        }
        self.save_store()
    }

    /// Get order by ID
    pub fn get_order(&self, order_id: i64) -> Option<PurchaseOrder> {
        let store = self.store.lock().unwrap();
        store.orders.iter().find(|o| o.id == order_id).cloned()
    }

    /// Apply a mutation to an order and persist it
    pub fn update_order<F>(&self, order_id: i64, apply: F) -> Result<Option<PurchaseOrder>>
    where
        F: FnOnce(&mut PurchaseOrder),
    {
        let updated = {
            let mut store = self.store.lock().unwrap();
            match store.orders.iter_mut().find(|o| o.id == order_id) {
                Some(order) => {
                    apply(order);
                    Some(order.clone())
                }
                None => None,
            }
        };
        if updated.is_some() {
            self.save_store()?;
        }
        Ok(updated)
    }

    /// All orders currently awaiting approval
    pub fn pending_orders(&self) -> Vec<PurchaseOrder> {
        let store = self.store.lock().unwrap();
        store
            .orders
            .iter()
            .filter(|o| o.approval_status == ApprovalStatus::Pending)
            .cloned()
            .collect()
    }

    /// Whether a delivered order exists for the vendor
    pub fn has_delivered_order_for_vendor(&self, vendor_id: i64) -> bool {
        let store = self.store.lock().unwrap();
        store
            .orders
            .iter()
            .any(|o| o.vendor_id == Some(vendor_id) && o.order_status == OrderStatus::Delivered)
    }

    // ---- step instances ----

    /// Insert a batch of step instances
    pub fn insert_instances(&self, instances: Vec<ApprovalStepInstance>) -> Result<()> {
        {
            let mut store = self.store.lock().unwrap();
            store.instances.extend(instances);
        }
        self.save_store()
    }

    /// Get step instance by ID
    pub fn get_instance(&self, step_id: Uuid) -> Option<ApprovalStepInstance> {
        let store = self.store.lock().unwrap();
        store.instances.iter().find(|i| i.id == step_id).cloned()
    }

    /// All instances for an order, ordered by step
    pub fn instances_for_order(&self, order_id: i64) -> Vec<ApprovalStepInstance> {
        let store = self.store.lock().unwrap();
        let mut instances: Vec<_> = store
            .instances
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        instances.sort_by_key(|i| i.step_order);
        instances
    }

    /// Active pending instances for an order, ordered by step
    pub fn active_pending_instances(&self, order_id: i64) -> Vec<ApprovalStepInstance> {
        let store = self.store.lock().unwrap();
        let mut instances: Vec<_> = store
            .instances
            .iter()
            .filter(|i| i.order_id == order_id && i.is_active && i.status == StepStatus::Pending)
            .cloned()
            .collect();
        instances.sort_by_key(|i| i.step_order);
        instances
    }

    /// Apply a mutation to a step only if it is still active and pending.
    /// The check and the mutation happen under one lock, so a losing
    /// concurrent writer observes `NotPending` and changes nothing. A step
    /// deactivated by a chain rejection is not updatable even though its
    /// status never advanced past `Pending`.
    pub fn update_step_if_pending<F>(&self, step_id: Uuid, apply: F) -> Result<StepUpdate>
    where
        F: FnOnce(&mut ApprovalStepInstance),
    {
        let outcome = {
            let mut store = self.store.lock().unwrap();
            match store.instances.iter_mut().find(|i| i.id == step_id) {
                Some(step) if step.is_active && step.status == StepStatus::Pending => {
                    apply(step);
                    StepUpdate::Updated(step.clone())
                }
                Some(step) => StepUpdate::NotPending(step.status),
                None => StepUpdate::Missing,
            }
        };
        if matches!(outcome, StepUpdate::Updated(_)) {
            self.save_store()?;
        }
        Ok(outcome)
    }

    /// Deactivate every still-pending instance of an order except one.
    /// Returns how many instances were deactivated.
    pub fn deactivate_other_pending_steps(&self, order_id: i64, except: Uuid) -> Result<usize> {
        let count = {
            let mut store = self.store.lock().unwrap();
            let mut count = 0;
            for step in store.instances.iter_mut().filter(|i| {
                i.order_id == order_id
                    && i.id != except
                    && i.is_active
                    && i.status == StepStatus::Pending
            }) {
                step.is_active = false;
                count += 1;
            }
            count
        };
        if count > 0 {
            self.save_store()?;
        }
        Ok(count)
    }

    /// Deactivate every instance of an order (e.g. before a resubmission).
    /// Returns how many instances were deactivated.
    pub fn deactivate_instances(&self, order_id: i64) -> Result<usize> {
        let count = {
            let mut store = self.store.lock().unwrap();
            let mut count = 0;
            for step in store
                .instances
                .iter_mut()
                .filter(|i| i.order_id == order_id && i.is_active)
            {
                step.is_active = false;
                count += 1;
            }
            count
        };
        if count > 0 {
            self.save_store()?;
        }
        Ok(count)
    }

    // ---- history ----

    /// Append an order history record
    pub fn append_history(&self, record: OrderHistoryRecord) -> Result<()> {
        {
            let mut store = self.store.lock().unwrap();
            store.history.push(record);
        }
        self.save_store()
    }

    /// History records for an order, oldest first
    pub fn history_for_order(&self, order_id: i64) -> Vec<OrderHistoryRecord> {
        let store = self.store.lock().unwrap();
        let mut records: Vec<_> = store
            .history
            .iter()
            .filter(|h| h.order_id == order_id)
            .cloned()
            .collect();
        records.sort_by_key(|h| h.created_at);
        records
    }
}
