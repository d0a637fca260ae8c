use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::store::Faults;

/// Outcome of a conditional write.
#[derive(Debug, Clone)]
pub enum Cas<T> {
    /// The predicate held; carries the record after the mutation.
    Applied(T),
    /// The predicate failed; carries the record as it was observed.
    Rejected(T),
}

/// A keyed collection of records supporting compare-and-swap updates.
///
/// Every method returns owned clones so that no shard guard outlives the call.
pub struct Table<T> {
    name: &'static str,
    rows: DashMap<Uuid, T>,
    faults: Arc<Faults>,
}

impl<T: Clone> Table<T> {
    pub(crate) fn new(name: &'static str, faults: Arc<Faults>) -> Self {
        Self {
            name,
            rows: DashMap::new(),
            faults,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn insert(&self, id: Uuid, row: T) -> Result<T, AppError> {
        self.faults.check(self.name)?;
        self.rows.insert(id, row.clone());
        Ok(row)
    }

    pub fn find(&self, id: Uuid) -> Option<T> {
        self.rows.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get(&self, id: Uuid) -> Result<T, AppError> {
        self.find(id)
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", self.singular(), id)))
    }

    /// Applies `mutate` only if `predicate` holds for the current record, atomically
    /// with respect to every other writer of the same row.
    pub fn update_if<P, F>(&self, id: Uuid, predicate: P, mutate: F) -> Result<Cas<T>, AppError>
    where
        P: FnOnce(&T) -> bool,
        F: FnOnce(&mut T),
    {
        self.faults.check(self.name)?;

        let mut entry = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", self.singular(), id)))?;

        if !predicate(entry.value()) {
            return Ok(Cas::Rejected(entry.value().clone()));
        }

        mutate(entry.value_mut());
        Ok(Cas::Applied(entry.value().clone()))
    }

    /// Removes the row if `predicate` holds; returns the removed record.
    pub fn remove_if<P>(&self, id: Uuid, predicate: P) -> Result<Option<T>, AppError>
    where
        P: FnOnce(&T) -> bool,
    {
        self.faults.check(self.name)?;
        Ok(self
            .rows
            .remove_if(&id, |_, row| predicate(row))
            .map(|(_, row)| row))
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.rows
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn singular(&self) -> &'static str {
        self.name.strip_suffix('s').unwrap_or(self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::{Cas, Table};
    use crate::error::AppError;
    use crate::store::Faults;

    #[test]
    fn rejected_update_leaves_row_untouched() {
        let table = Table::new("counters", Arc::new(Faults::default()));
        let id = Uuid::new_v4();
        table.insert(id, 1_u32).unwrap();

        let outcome = table.update_if(id, |v| *v == 2, |v| *v = 3).unwrap();
        assert!(matches!(outcome, Cas::Rejected(1)));
        assert_eq!(table.find(id), Some(1));

        let outcome = table.update_if(id, |v| *v == 1, |v| *v = 3).unwrap();
        assert!(matches!(outcome, Cas::Applied(3)));
    }

    #[test]
    fn missing_row_reports_not_found_with_singular_name() {
        let table: Table<u32> = Table::new("parcels", Arc::new(Faults::default()));
        let err = table.get(Uuid::nil()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(msg) if msg.starts_with("parcel ")));
    }

    #[test]
    fn injected_fault_blocks_writes_but_not_reads() {
        let faults = Arc::new(Faults::default());
        let table = Table::new("proofs", faults.clone());
        let id = Uuid::new_v4();
        table.insert(id, 7_u32).unwrap();

        faults.inject("proofs");
        assert!(matches!(
            table.insert(Uuid::new_v4(), 8),
            Err(AppError::DependencyFailure(_))
        ));
        assert_eq!(table.find(id), Some(7));

        faults.clear();
        assert!(table.insert(Uuid::new_v4(), 8).is_ok());
    }
}
