//! Lock-guarded station registry.
//!
//! All reads and writes go through one `RwLock`. Lock scope is map
//! manipulation only: JSON parsing happens before the lock is taken and no
//! network call is ever made while it is held.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};
use zero_core::{StationConfig, StationDocument, StationState};

use super::errors::RegistryError;

/// Registry key for a station name (ASCII case-insensitive).
fn key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[derive(Debug, Default)]
struct RegistryState {
    configs: HashMap<String, StationConfig>,
    documents: HashMap<String, StationDocument>,
}

/// The local copy of the coordinator's station registry.
///
/// Owned by the application and shared as `Arc<StationRegistry>`; there is
/// no process-global instance. Callers only ever receive clones.
#[derive(Debug, Default)]
pub struct StationRegistry {
    inner: RwLock<RegistryState>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Looks up a station by name.
    pub fn get(&self, name: &str) -> Option<StationConfig> {
        self.read().configs.get(&key(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().configs.contains_key(&key(name))
    }

    pub fn len(&self) -> usize {
        self.read().configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().configs.is_empty()
    }

    /// All stations, sorted by name.
    pub fn snapshot(&self) -> Vec<StationConfig> {
        self.snapshot_where(|_| true)
    }

    /// Stations matching `predicate`, sorted by name.
    pub fn snapshot_where<F>(&self, mut predicate: F) -> Vec<StationConfig>
    where
        F: FnMut(&StationConfig) -> bool,
    {
        let mut configs: Vec<StationConfig> = self
            .read()
            .configs
            .values()
            .filter(|config| predicate(config))
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    /// Visits every station under a single read lock.
    ///
    /// The visitor only sees `&StationConfig` and cannot reach the lock, so
    /// it cannot re-enter the registry.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&StationConfig),
    {
        let state = self.read();
        for config in state.configs.values() {
            visitor(config);
        }
    }

    /// Fails if any station other than `exclude` answers to one of the
    /// candidate's names.
    pub fn check_name_collision(
        &self,
        candidate: &StationConfig,
        exclude: Option<&str>,
    ) -> Result<(), RegistryError> {
        let exclude = exclude.map(key);
        find_collision(&self.read().configs, candidate, exclude.as_deref())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Parses `json` and inserts or replaces the station.
    pub fn upsert_from_document(
        &self,
        name: &str,
        json: &str,
    ) -> Result<StationConfig, RegistryError> {
        self.upsert_from_document_with(name, json, |_, _| {})
    }

    /// Like [`upsert_from_document`](Self::upsert_from_document), but lets the
    /// caller adjust the parsed config against the previous entry while the
    /// write lock is held.
    pub fn upsert_from_document_with<F>(
        &self,
        name: &str,
        json: &str,
        adjust: F,
    ) -> Result<StationConfig, RegistryError>
    where
        F: FnOnce(Option<&StationConfig>, &mut StationConfig),
    {
        let config = StationConfig::from_json(name, json).map_err(|e| {
            warn!(station = %name, error = %e, "Rejected station document");
            RegistryError::from(e)
        })?;

        let mut state = self.write();
        upsert_into(&mut state.configs, name, config, adjust)
    }

    /// Inserts or replaces an already parsed station.
    pub fn upsert(&self, config: StationConfig) -> Result<StationConfig, RegistryError> {
        let name = config.name.clone();
        let mut state = self.write();
        upsert_into(&mut state.configs, &name, config, |_, _| {})
    }

    /// Moves a station to `next(current)` and returns the new value.
    ///
    /// Only the lifecycle state can change here; names go through the upsert
    /// path so collisions are always checked.
    pub fn set_state<F>(&self, name: &str, next: F) -> Option<StationConfig>
    where
        F: FnOnce(StationState) -> StationState,
    {
        let mut state = self.write();
        let config = state.configs.get_mut(&key(name))?;
        config.state = next(config.state);
        Some(config.clone())
    }

    /// Marks a station `Remove`, deletes it and returns the removed value.
    pub fn remove(&self, name: &str) -> Option<StationConfig> {
        let mut removed = self.write().configs.remove(&key(name))?;
        removed.state = StationState::Remove;
        debug!(station = %removed.name, "Station removed");
        Some(removed)
    }

    /// Replaces the registry contents from a JSON array of station documents.
    ///
    /// Every entry goes through the single-entry upsert path against a staged
    /// copy; the copy is swapped in only if every entry succeeds. Stations
    /// missing from the batch are kept.
    pub fn replace_all(&self, json_array: &str) -> Result<usize, RegistryError> {
        let value: Value = serde_json::from_str(json_array).map_err(|e| {
            warn!(error = %e, "Rejected station batch");
            RegistryError::InvalidDocument(e.to_string())
        })?;
        let Value::Array(entries) = value else {
            warn!("Rejected station batch: not an array");
            return Err(RegistryError::NotAnArray);
        };

        // Parse outside the lock
        let mut parsed = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let config = StationConfig::from_value("", entry)
                .map_err(|e| RegistryError::from(e).in_batch(index))?;
            parsed.push(config);
        }

        let count = parsed.len();
        let mut state = self.write();
        let mut staged = state.configs.clone();
        for (index, config) in parsed.into_iter().enumerate() {
            let name = config.name.clone();
            upsert_into(&mut staged, &name, config, |_, _| {}).map_err(|e| {
                warn!(station = %name, error = %e, "Station batch aborted");
                e.in_batch(index)
            })?;
        }
        state.configs = staged;
        debug!(count, total = state.configs.len(), "Station batch applied");
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    pub fn document(&self, name: &str) -> Option<StationDocument> {
        self.read().documents.get(&key(name)).cloned()
    }

    /// Stores a station document unless a local one is already present.
    ///
    /// Returns true if the document was stored.
    pub fn attach_document(&self, name: &str, document: StationDocument) -> bool {
        let mut state = self.write();
        let slot = key(name);
        if let Some(existing) = state.documents.get(&slot) {
            if existing.is_local && !document.is_local {
                debug!(station = %name, "Kept local document");
                return false;
            }
        }
        state.documents.insert(slot, document);
        true
    }
}

/// Shared upsert path for single entries and staged batches.
///
/// `name` locates the entry being replaced. When the parsed config carries a
/// different station name the entry is renamed.
fn upsert_into<F>(
    configs: &mut HashMap<String, StationConfig>,
    name: &str,
    mut config: StationConfig,
    adjust: F,
) -> Result<StationConfig, RegistryError>
where
    F: FnOnce(Option<&StationConfig>, &mut StationConfig),
{
    let lookup = key(name);
    let new_key = key(&config.name);

    let old_key = if configs.contains_key(&lookup) {
        Some(lookup)
    } else if configs.contains_key(&new_key) {
        Some(new_key.clone())
    } else {
        None
    };

    find_collision(configs, &config, old_key.as_deref())?;

    adjust(old_key.as_ref().and_then(|k| configs.get(k)), &mut config);

    if let Some(old) = old_key.filter(|k| *k != new_key) {
        debug!(from = %old, to = %config.name, "Station renamed");
        configs.remove(&old);
    }
    configs.insert(new_key, config.clone());
    Ok(config)
}

fn find_collision(
    configs: &HashMap<String, StationConfig>,
    candidate: &StationConfig,
    exclude: Option<&str>,
) -> Result<(), RegistryError> {
    for (slot, existing) in configs {
        if Some(slot.as_str()) == exclude {
            continue;
        }
        if let Some(name) = existing.shared_name(candidate) {
            return Err(RegistryError::NameCollision {
                name: name.to_string(),
                holder: existing.name.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(name: &str, short: &str, aliases: &[&str]) -> String {
        json!({
            "station_name": name,
            "short_name": short,
            "station_alias": aliases,
            "station_state": 1,
        })
        .to_string()
    }

    #[test]
    fn test_upsert_and_get() {
        let registry = StationRegistry::new();
        let stored = registry
            .upsert_from_document("Order", &doc("Order", "ord", &[]))
            .unwrap();

        assert_eq!(stored.name, "Order");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("order").unwrap().short_name, "ord");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_upsert_rejects_empty_and_non_object() {
        let registry = StationRegistry::new();
        assert!(matches!(
            registry.upsert_from_document("a", "  "),
            Err(RegistryError::InvalidDocument(_))
        ));
        assert!(matches!(
            registry.upsert_from_document("a", "[]"),
            Err(RegistryError::InvalidDocument(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_upsert_replaces_same_station() {
        let registry = StationRegistry::new();
        registry
            .upsert_from_document("Order", &doc("Order", "ord", &["o"]))
            .unwrap();
        // Re-publishing the same names is not a collision with itself
        registry
            .upsert_from_document("Order", &doc("Order", "ord", &["o", "orders"]))
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Order").unwrap().aliases.len(), 2);
    }

    #[test]
    fn test_collision_rejected() {
        let registry = StationRegistry::new();
        registry
            .upsert_from_document("Order", &doc("Order", "ord", &["sales"]))
            .unwrap();

        let err = registry
            .upsert_from_document("Billing", &doc("Billing", "bill", &["SALES"]))
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::NameCollision { ref holder, .. } if holder == "Order"
        ));
        assert!(registry.get("Billing").is_none());
    }

    #[test]
    fn test_rename_moves_entry() {
        let registry = StationRegistry::new();
        registry
            .upsert_from_document("Old", &doc("Old", "old", &[]))
            .unwrap();
        registry
            .upsert_from_document("Old", &doc("New", "new", &[]))
            .unwrap();

        assert!(registry.get("Old").is_none());
        assert_eq!(registry.get("New").unwrap().short_name, "new");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_adjust_sees_previous_entry() {
        let registry = StationRegistry::new();
        registry
            .upsert_from_document("Order", &doc("Order", "ord", &[]))
            .unwrap();
        registry.set_state("Order", |_| StationState::Pause);

        let stored = registry
            .upsert_from_document_with("Order", &doc("Order", "ord", &[]), |prev, config| {
                if let Some(prev) = prev {
                    config.state = prev.state;
                }
            })
            .unwrap();
        assert_eq!(stored.state, StationState::Pause);
    }

    #[test]
    fn test_remove_marks_state() {
        let registry = StationRegistry::new();
        registry
            .upsert_from_document("Order", &doc("Order", "ord", &[]))
            .unwrap();

        let removed = registry.remove("ORDER").unwrap();
        assert_eq!(removed.state, StationState::Remove);
        assert!(registry.is_empty());
        assert!(registry.remove("Order").is_none());
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let registry = StationRegistry::new();
        registry
            .upsert_from_document("Keep", &doc("Keep", "keep", &[]))
            .unwrap();

        // Second entry collides with the first one in the same batch
        let batch = format!(
            "[{}, {}]",
            doc("A", "a", &["shared"]),
            doc("B", "b", &["shared"])
        );
        let err = registry.replace_all(&batch).unwrap_err();
        assert!(matches!(err, RegistryError::BatchRejected { index: 1, .. }));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("A").is_none());

        let batch = format!("[{}, {}]", doc("A", "a", &[]), doc("B", "b", &[]));
        assert_eq!(registry.replace_all(&batch).unwrap(), 2);
        assert_eq!(registry.len(), 3);

        assert!(matches!(
            registry.replace_all("{}"),
            Err(RegistryError::NotAnArray)
        ));
    }

    #[test]
    fn test_snapshot_sorted_and_filtered() {
        let registry = StationRegistry::new();
        registry.upsert(StationConfig::new("b")).unwrap();
        registry.upsert(StationConfig::new("a")).unwrap();
        registry.set_state("b", |_| StationState::Run);

        let names: Vec<_> = registry.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        let running = registry.snapshot_where(|c| c.state.is_running());
        assert_eq!(running.len(), 1);

        let mut visited = 0;
        registry.for_each(|_| visited += 1);
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_check_name_collision_with_exclude() {
        let registry = StationRegistry::new();
        registry
            .upsert(StationConfig::new("Order").with_short_name("ord"))
            .unwrap();

        let candidate = StationConfig::new("Order2").with_short_name("ORD");
        assert!(registry.check_name_collision(&candidate, None).is_err());
        assert!(registry.check_name_collision(&candidate, Some("order")).is_ok());
    }

    #[test]
    fn test_local_document_wins() {
        let registry = StationRegistry::new();
        assert!(registry.attach_document("api", StationDocument::local(json!({"v": 1}))));
        assert!(!registry.attach_document("API", StationDocument::remote(json!({"v": 2}))));
        assert_eq!(registry.document("api").unwrap().body, json!({"v": 1}));

        // A remote document can be replaced by another remote one
        assert!(registry.attach_document("web", StationDocument::remote(json!({"v": 1}))));
        assert!(registry.attach_document("web", StationDocument::remote(json!({"v": 2}))));
        assert_eq!(registry.document("web").unwrap().body, json!({"v": 2}));
    }
}
