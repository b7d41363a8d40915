//! Shared create/replace/delete convergence plan (§4.6, §4.7): identical
//! discipline for both the Stream Supervisor and Registration Sync, over
//! whatever key/value types each backend uses.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<K, V> {
    Create(K, V),
    Replace(K, V),
    Delete(K),
}

/// Compute the convergence plan from `observed` (pre-filtered to entries
/// this core owns) to `desired`. Never touches anything absent from both
/// maps — callers are responsible for excluding non-owned entries from
/// `observed` before calling this.
pub fn diff<K, V>(desired: &HashMap<K, V>, observed: &HashMap<K, V>) -> Vec<Action<K, V>>
where
    K: Eq + Hash + Clone + Ord,
    V: PartialEq + Clone,
{
    let mut actions = Vec::new();

    let mut keys: Vec<&K> = desired.keys().chain(observed.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        match (desired.get(key), observed.get(key)) {
            (Some(want), None) => actions.push(Action::Create(key.clone(), want.clone())),
            (None, Some(_)) => actions.push(Action::Delete(key.clone())),
            (Some(want), Some(have)) if want != have => actions.push(Action::Replace(key.clone(), want.clone())),
            _ => {}
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_when_desired_equals_observed() {
        let mut map = HashMap::new();
        map.insert("u1".to_string(), "hash-a".to_string());
        let actions = diff(&map, &map);
        assert!(actions.is_empty());
    }

    #[test]
    fn missing_from_observed_creates() {
        let mut desired = HashMap::new();
        desired.insert("u1".to_string(), "hash-a".to_string());
        let observed = HashMap::new();
        assert_eq!(diff(&desired, &observed), vec![Action::Create("u1".to_string(), "hash-a".to_string())]);
    }

    #[test]
    fn missing_from_desired_deletes() {
        let desired = HashMap::new();
        let mut observed = HashMap::new();
        observed.insert("u1".to_string(), "hash-a".to_string());
        assert_eq!(diff(&desired, &observed), vec![Action::Delete("u1".to_string())]);
    }

    #[test]
    fn differing_value_replaces() {
        let mut desired = HashMap::new();
        desired.insert("u1".to_string(), "hash-b".to_string());
        let mut observed = HashMap::new();
        observed.insert("u1".to_string(), "hash-a".to_string());
        assert_eq!(diff(&desired, &observed), vec![Action::Replace("u1".to_string(), "hash-b".to_string())]);
    }

    #[test]
    fn non_owned_entries_never_enter_the_diff() {
        // Simulated by simply not including them in `observed`; ownership
        // filtering happens before this function is called.
        let desired: HashMap<String, String> = HashMap::new();
        let observed: HashMap<String, String> = HashMap::new();
        assert!(diff(&desired, &observed).is_empty());
    }
}
