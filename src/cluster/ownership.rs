//! Owner references between intents and execution units
//!
//! The child records its parent. Deleting the parent lets a garbage
//! collection pass remove every child whose recorded owners are all gone.

use std::collections::HashSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

/// Controller owner reference pointing at `owner`, `None` if it has no uid yet
pub fn owner_reference<K>(owner: &K) -> Option<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&())
}

/// Whether `meta` records `uid` as one of its owners
pub fn is_owned_by(meta: &ObjectMeta, uid: &str) -> bool {
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|reference| reference.uid == uid)
}

/// Whether `meta` records any owner at all
pub fn has_owner(meta: &ObjectMeta) -> bool {
    !meta
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .is_empty()
}

/// Record `reference` on `meta`. Returns false when it was already present.
pub fn attach(meta: &mut ObjectMeta, reference: OwnerReference) -> bool {
    if is_owned_by(meta, &reference.uid) {
        return false;
    }
    meta.owner_references
        .get_or_insert_with(Vec::new)
        .push(reference);
    true
}

/// A child is orphaned when it records owners and none of them is alive
pub fn is_orphaned(meta: &ObjectMeta, live_uids: &HashSet<String>) -> bool {
    let owners = meta.owner_references.as_deref().unwrap_or_default();
    !owners.is_empty() && owners.iter().all(|reference| !live_uids.contains(&reference.uid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "backup.oiler.dev/v1alpha1".to_string(),
            kind: "DatabaseBackup".to_string(),
            name: "pg".to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn attach_is_idempotent() {
        let mut meta = ObjectMeta::default();
        assert!(attach(&mut meta, reference("uid-1")));
        assert!(!attach(&mut meta, reference("uid-1")));
        assert_eq!(meta.owner_references.as_ref().map(Vec::len), Some(1));
        assert!(is_owned_by(&meta, "uid-1"));
    }

    #[test]
    fn unowned_objects_are_never_orphans() {
        let meta = ObjectMeta::default();
        assert!(!has_owner(&meta));
        assert!(!is_orphaned(&meta, &HashSet::new()));
    }

    #[test]
    fn orphaned_once_every_owner_is_gone() {
        let mut meta = ObjectMeta::default();
        attach(&mut meta, reference("uid-1"));
        let live: HashSet<String> = ["uid-1".to_string()].into_iter().collect();
        assert!(!is_orphaned(&meta, &live));
        assert!(is_orphaned(&meta, &HashSet::new()));
    }
}
