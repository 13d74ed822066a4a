//! Snapshot listener capability and the fan-out that multicasts to many

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::types::SnapshotBatch;

/// Anything interested in ingested snapshots
pub trait CounterSnapshotListener: Send + Sync {
    fn on_snapshot(&self, snapshot: &SnapshotBatch) -> Result<()>;
}

#[derive(Debug, Error)]
#[error("Snapshot listener {index} of {count} failed for '{label}': {source}")]
pub struct FanOutError {
    pub index: usize,
    pub count: usize,
    pub label: String,
    #[source]
    pub source: anyhow::Error,
}

/// Forwards every snapshot to a fixed, ordered list of delegates
///
/// Delegates run synchronously on the caller's thread in registration
/// order. The first failure skips the remaining delegates for that call.
pub struct AggregateListener {
    delegates: Vec<Arc<dyn CounterSnapshotListener>>,
}

impl AggregateListener {
    pub fn new(delegates: Vec<Arc<dyn CounterSnapshotListener>>) -> Self {
        Self { delegates }
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

impl CounterSnapshotListener for AggregateListener {
    fn on_snapshot(&self, snapshot: &SnapshotBatch) -> Result<()> {
        let count = self.delegates.len();
        for (index, delegate) in self.delegates.iter().enumerate() {
            delegate.on_snapshot(snapshot).map_err(|source| FanOutError {
                index,
                count,
                label: snapshot.label.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    /// Records (delegate name, batch label) into a shared journal
    struct Recorder {
        name: &'static str,
        journal: Arc<Mutex<Vec<(&'static str, String)>>>,
        fail: bool,
    }

    impl CounterSnapshotListener for Recorder {
        fn on_snapshot(&self, snapshot: &SnapshotBatch) -> Result<()> {
            self.journal.lock().unwrap().push((self.name, snapshot.label.clone()));
            if self.fail {
                bail!("{} refused snapshot", self.name);
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        journal: &Arc<Mutex<Vec<(&'static str, String)>>>,
        fail: bool,
    ) -> Arc<dyn CounterSnapshotListener> {
        Arc::new(Recorder {
            name,
            journal: journal.clone(),
            fail,
        })
    }

    fn batch(label: &str) -> SnapshotBatch {
        SnapshotBatch {
            label: label.to_string(),
            timestamp: 1,
            ..Default::default()
        }
    }

    #[test]
    fn delivers_once_to_every_delegate_in_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let fan_out = AggregateListener::new(vec![
            recorder("store", &journal, false),
            recorder("rates", &journal, false),
            recorder("audit", &journal, false),
        ]);

        fan_out.on_snapshot(&batch("client")).unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                ("store", "client".to_string()),
                ("rates", "client".to_string()),
                ("audit", "client".to_string()),
            ]
        );
    }

    #[test]
    fn failure_skips_remaining_delegates_and_propagates() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let fan_out = AggregateListener::new(vec![
            recorder("store", &journal, false),
            recorder("rates", &journal, true),
            recorder("audit", &journal, false),
        ]);

        let err = fan_out.on_snapshot(&batch("server")).unwrap_err();
        let fan_out_err = err.downcast_ref::<FanOutError>().unwrap();
        assert_eq!(fan_out_err.index, 1);
        assert_eq!(fan_out_err.count, 3);
        assert_eq!(fan_out_err.label, "server");

        let names: Vec<_> = journal.lock().unwrap().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["store", "rates"]);
    }

    #[test]
    fn failure_is_per_call_not_permanent() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let fan_out = AggregateListener::new(vec![
            recorder("flaky", &journal, true),
            recorder("store", &journal, false),
        ]);

        assert!(fan_out.on_snapshot(&batch("a")).is_err());
        assert!(fan_out.on_snapshot(&batch("b")).is_err());
        assert_eq!(journal.lock().unwrap().len(), 2);
    }

    #[test]
    fn fan_outs_compose() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let inner: Arc<dyn CounterSnapshotListener> = Arc::new(AggregateListener::new(vec![
            recorder("inner-a", &journal, false),
            recorder("inner-b", &journal, false),
        ]));
        let outer = AggregateListener::new(vec![inner, recorder("outer", &journal, false)]);

        outer.on_snapshot(&batch("client")).unwrap();
        assert_eq!(outer.len(), 2);
        let names: Vec<_> = journal.lock().unwrap().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["inner-a", "inner-b", "outer"]);
    }

    #[test]
    fn empty_fan_out_is_a_no_op() {
        let fan_out = AggregateListener::new(Vec::new());
        assert!(fan_out.is_empty());
        fan_out.on_snapshot(&batch("client")).unwrap();
    }
}
