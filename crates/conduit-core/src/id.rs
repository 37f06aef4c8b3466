use slotmap::new_key_type;

new_key_type! {
    /// Identifies a conduit node in the network.
    pub struct NodeId;

    /// Identifies a host-owned endpoint (generator, machine, storage block).
    pub struct EndpointId;
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn removed_keys_are_not_reused() {
        let mut sm: SlotMap<NodeId, ()> = SlotMap::with_key();
        let a = sm.insert(());
        sm.remove(a);
        let b = sm.insert(());
        assert_ne!(a, b, "generational keys must differ after reuse");
        assert!(!sm.contains_key(a));
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashSet;
        let mut sm: SlotMap<EndpointId, ()> = SlotMap::with_key();
        let set: HashSet<EndpointId> = (0..3).map(|_| sm.insert(())).collect();
        assert_eq!(set.len(), 3);
    }
}
