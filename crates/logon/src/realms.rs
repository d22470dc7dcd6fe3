use std::collections::HashMap;

use crate::config::RealmEntry;

#[derive(Debug, Clone)]
pub struct Realm {
    pub id: u8,
    pub name: String,
    password: String,
}

/// Realms allowed to link to this logon server.
#[derive(Debug, Clone, Default)]
pub struct RealmRegistry {
    realms: HashMap<u8, Realm>,
}

impl RealmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[RealmEntry]) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            if registry.get(entry.id).is_some() {
                log::warn!("Realm {} is configured twice, keeping the last entry", entry.id);
            }
            registry.insert(entry.id, &entry.name, &entry.password);
        }
        registry
    }

    pub fn insert(&mut self, id: u8, name: &str, password: &str) {
        self.realms.insert(
            id,
            Realm {
                id,
                name: name.to_string(),
                password: password.to_string(),
            },
        );
    }

    pub fn get(&self, id: u8) -> Option<&Realm> {
        self.realms.get(&id)
    }

    /// False for unknown realms.
    // TODO: compare against a stored hash once realm secrets move out of plaintext config.
    pub fn check_password(&self, id: u8, password: &str) -> bool {
        self.get(id).is_some_and(|realm| realm.password == password)
    }

    pub fn len(&self) -> usize {
        self.realms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u8, password: &str) -> RealmEntry {
        RealmEntry {
            id,
            name: format!("Realm {}", id),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_password_check() {
        let registry = RealmRegistry::from_entries(&[entry(1, "one"), entry(2, "two")]);

        assert!(registry.check_password(1, "one"));
        assert!(!registry.check_password(1, "two"));
        assert!(!registry.check_password(3, "one"));
        assert!(!registry.check_password(1, ""));
    }

    #[test]
    fn test_duplicate_id_keeps_last() {
        let registry = RealmRegistry::from_entries(&[entry(1, "old"), entry(1, "new")]);
        assert_eq!(registry.len(), 1);
        assert!(registry.check_password(1, "new"));
        assert!(!registry.check_password(1, "old"));
    }
}
