use prefdb_core::BatchOp;

/// Mutations buffered while an edit is in progress, applied later as one
/// atomic engine write. Ops keep their append order; the engine resolves
/// later ops on the same key as winning.
#[derive(Debug, Default)]
pub(crate) struct PendingBatch {
    ops: Vec<BatchOp>,
}

impl PendingBatch {
    pub(crate) fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub(crate) fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub(crate) fn clear(&mut self) {
        self.ops.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_keep_append_order() {
        let mut batch = PendingBatch::default();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.delete(b"a".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        assert_eq!(batch.ops().len(), 3);
        assert_eq!(batch.ops()[1], BatchOp::Delete { key: b"a".to_vec() });
    }

    #[test]
    fn clear_empties_the_batch() {
        let mut batch = PendingBatch::default();
        batch.put(b"a".to_vec(), b"1".to_vec());
        assert!(!batch.is_empty());
        batch.clear();
        assert!(batch.is_empty());
    }
}
