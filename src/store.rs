use anyhow::{bail, Context, Result};
use chrono::Local;
use log::{debug, info};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::model::{EnergyBill, NewEnergyBill};

/// Where finalized bills live. Failures leave the caller's draft untouched.
pub trait BillStore {
    /// All bills, in stored (chronological) order.
    fn list(&self) -> Result<Vec<EnergyBill>>;

    /// Persist a new bill and return it with its assigned id and timestamps.
    fn create(&mut self, bill: NewEnergyBill) -> Result<EnergyBill>;

    /// Replace the bill with `id`, keeping its id and creation time.
    fn update(&mut self, id: &str, bill: NewEnergyBill) -> Result<EnergyBill>;

    /// Remove the bill with `id`. An unknown id is an error and nothing changes.
    fn delete(&mut self, id: &str) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<EnergyBill>> {
        Ok(self.list()?.into_iter().find(|b| b.id == id))
    }
}

/// Bills kept as a pretty-printed JSON array in one file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_all(&self, bills: &[EnergyBill]) -> Result<()> {
        let json = serde_json::to_string_pretty(bills).context("Failed to serialize bills")?;

        // Sibling file + rename: the old history stays intact until the swap.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Wrote {} bill(s) to {}", bills.len(), self.path.display());
        Ok(())
    }
}

/// Next free `bill-{n}` id.
fn next_id(bills: &[EnergyBill]) -> String {
    let highest = bills
        .iter()
        .filter_map(|b| b.id.strip_prefix("bill-"))
        .filter_map(|n| n.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("bill-{}", highest + 1)
}

impl BillStore for JsonFileStore {
    fn list(&self) -> Result<Vec<EnergyBill>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No bill history at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse bills in {}", self.path.display()))
    }

    fn create(&mut self, bill: NewEnergyBill) -> Result<EnergyBill> {
        let mut bills = self.list()?;
        let now = Local::now();
        let created = bill.into_bill(next_id(&bills), now, now);
        bills.push(created.clone());
        self.write_all(&bills)?;
        info!("Created {} for group {}", created.id, created.group_id);
        Ok(created)
    }

    fn update(&mut self, id: &str, bill: NewEnergyBill) -> Result<EnergyBill> {
        let mut bills = self.list()?;
        let Some(slot) = bills.iter_mut().find(|b| b.id == id) else {
            bail!("No bill with id {} in {}", id, self.path.display());
        };
        let updated = bill.into_bill(id.to_string(), slot.created_at, Local::now());
        *slot = updated.clone();
        self.write_all(&bills)?;
        info!("Updated {} for group {}", updated.id, updated.group_id);
        Ok(updated)
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        let mut bills = self.list()?;
        let Some(position) = bills.iter().position(|b| b.id == id) else {
            bail!("No bill with id {} in {}", id, self.path.display());
        };
        let removed = bills.remove(position);
        self.write_all(&bills)?;
        info!("Deleted {} from group {}", removed.id, removed.group_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candidate(group_id: &str, consumption: f64) -> NewEnergyBill {
        NewEnergyBill {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            group_id: group_id.into(),
            group_name: "Vila".into(),
            total_group_value: 900.0,
            total_group_consumption: consumption,
            ..Default::default()
        }
    }

    #[test]
    fn missing_file_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("bills.json"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("bills.json"));
        let first = store.create(candidate("g1", 100.0)).unwrap();
        let second = store.create(candidate("g1", 110.0)).unwrap();
        assert_eq!(first.id, "bill-1");
        assert_eq!(second.id, "bill-2");

        let bills = store.list().unwrap();
        assert_eq!(bills.len(), 2);
        assert_eq!(bills[1].total_group_consumption, 110.0);
        assert!(!dir.path().join("bills.json.tmp").exists());
    }

    #[test]
    fn update_keeps_id_and_creation_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("bills.json"));
        let created = store.create(candidate("g1", 100.0)).unwrap();

        let updated = store.update(&created.id, candidate("g1", 130.0)).unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.last_updated >= created.last_updated);

        let stored = store.get(&created.id).unwrap().unwrap();
        assert_eq!(stored.total_group_consumption, 130.0);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn update_unknown_id_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("bills.json"));
        store.create(candidate("g1", 100.0)).unwrap();
        assert!(store.update("bill-9", candidate("g1", 1.0)).is_err());
        assert_eq!(store.list().unwrap()[0].total_group_consumption, 100.0);
    }

    #[test]
    fn delete_removes_only_that_bill() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("bills.json"));
        store.create(candidate("g1", 100.0)).unwrap();
        let second = store.create(candidate("g1", 110.0)).unwrap();
        store.create(candidate("g1", 120.0)).unwrap();

        store.delete(&second.id).unwrap();
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["bill-1", "bill-3"]);
        assert!(store.get(&second.id).unwrap().is_none());
        assert_eq!(store.create(candidate("g1", 1.0)).unwrap().id, "bill-4");
    }

    #[test]
    fn delete_unknown_id_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bills.json");
        let mut store = JsonFileStore::new(&path);
        store.create(candidate("g1", 100.0)).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        assert!(store.delete("bill-9").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bills.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(path);
        assert!(store.list().is_err());
    }

    #[test]
    fn next_id_skips_foreign_ids() {
        let now = Local::now();
        let bills = vec![
            candidate("g1", 1.0).into_bill("bill-4".into(), now, now),
            candidate("g1", 1.0).into_bill("imported-xyz".into(), now, now),
        ];
        assert_eq!(next_id(&bills), "bill-5");
        assert_eq!(next_id(&[]), "bill-1");
    }
}
