//! Save manager: the ordered task queue
//!
//! This module provides the SaveManager struct which handles:
//! - Queueing load/save/delete tasks in strict FIFO order
//! - Serializing entities before a save is dispatched
//! - Deserializing (or resetting) entities after a load completes
//! - Notifying listeners once per finished task
//!
//! All methods must be called from the controlling thread. Only the head of
//! the queue is ever out with the executor; the next task is dispatched after
//! the previous one has been fully processed and its listeners have run.

use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;

use super::executor::{DedicatedWorker, Executor, ThreadPoolExecutor};
use super::saveable::{Save, deserialize, serialize};
use super::target::StorageTarget;
use super::types::{Job, SaveError, SharedSave, Task, TaskId, TaskKind, catch_panic};
use crate::config::{ExecutionStrategy, SaveConfig};

type Listener = Box<dyn FnMut(&Task)>;

pub struct SaveManager {
    tasks: VecDeque<Task>,
    executor: Box<dyn Executor>,
    /// True while the head task is out with the executor
    in_flight: bool,
    listeners: Vec<Listener>,
    next_id: TaskId,
}

impl SaveManager {
    /// Creates a manager running its I/O on `executor`
    pub fn new(executor: impl Executor + 'static) -> Self {
        SaveManager {
            tasks: VecDeque::with_capacity(4),
            executor: Box::new(executor),
            in_flight: false,
            listeners: Vec::new(),
            next_id: 1,
        }
    }

    /// Manager backed by a private rayon pool
    pub fn with_thread_pool(threads: usize) -> Result<Self, SaveError> {
        Ok(Self::new(ThreadPoolExecutor::new(threads)?))
    }

    /// Manager backed by its own background thread
    pub fn with_dedicated_worker() -> Result<Self, SaveError> {
        Ok(Self::new(DedicatedWorker::new()?))
    }

    /// Manager using the strategy chosen in `config`
    pub fn from_config(config: &SaveConfig) -> Result<Self, SaveError> {
        match config.strategy {
            ExecutionStrategy::ThreadPool => Self::with_thread_pool(config.pool_threads),
            ExecutionStrategy::DedicatedWorker => Self::with_dedicated_worker(),
        }
    }

    /// Registers a callback run once per finished task, in queue order
    pub fn on_task_finished(&mut self, listener: impl FnMut(&Task) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Whether any task is queued or running.
    ///
    /// Check this (or call `flush`) before shutting down.
    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    /// Queues a save of `entity` to `target`.
    ///
    /// The entity is serialized right now, so later changes to it don't leak
    /// into this save. If serialization fails the task still goes through the
    /// queue, but the target is never written.
    pub fn enqueue_save(&mut self, entity: SharedSave, target: Arc<dyn StorageTarget>) -> TaskId {
        let mut task = self.new_task(TaskKind::Save, Some(entity), target);

        let serialized = match task.entity.as_ref().map(|e| e.try_borrow()) {
            Some(Ok(entity)) => serialize(&*entity),
            _ => Err(SaveError::EntityBusy),
        };
        match serialized {
            Ok(data) => task.payload = Some(data),
            Err(e) => {
                warn!("could not serialize save for {}: {}", task.target.name(), e);
                task.failure = Some(e);
            }
        }

        self.push(task)
    }

    /// Queues a load of `target` into `entity`
    pub fn enqueue_load(&mut self, entity: SharedSave, target: Arc<dyn StorageTarget>) -> TaskId {
        let task = self.new_task(TaskKind::Load, Some(entity), target);
        self.push(task)
    }

    /// Queues deletion of `target`
    pub fn enqueue_delete(&mut self, target: Arc<dyn StorageTarget>) -> TaskId {
        let task = self.new_task(TaskKind::Delete, None, target);
        self.push(task)
    }

    /// Per-frame tick. Picks up a finished task if there is one, processes it
    /// and dispatches the next. Never blocks.
    ///
    /// Returns the number of tasks finished during this call.
    pub fn update(&mut self) -> usize {
        if !self.in_flight {
            return 0;
        }
        match self.executor.poll() {
            Some(job) => {
                self.in_flight = false;
                1 + self.complete(job)
            }
            None => 0,
        }
    }

    /// Blocks until every queued task has finished.
    ///
    /// Meant for shutdown; during normal play use `update`.
    pub fn flush(&mut self) -> usize {
        let mut finished = 0;
        while self.in_flight {
            match self.executor.wait() {
                Some(job) => {
                    self.in_flight = false;
                    finished += 1 + self.complete(job);
                }
                None => {
                    // Executor lost track of the job; don't spin forever
                    warn!("executor returned nothing for an in-flight task");
                    self.in_flight = false;
                    if let Some(head) = self.tasks.front() {
                        let lost = Job::lost(head.id, head.kind, Arc::clone(&head.target));
                        finished += 1 + self.complete(lost);
                    }
                }
            }
        }
        finished
    }

    /// Drains the queue, then tears the executor down
    pub fn shutdown(mut self) {
        let finished = self.flush();
        debug!("save manager shut down after finishing {} task(s)", finished);
    }

    fn new_task(
        &mut self,
        kind: TaskKind,
        entity: Option<SharedSave>,
        target: Arc<dyn StorageTarget>,
    ) -> Task {
        let id = self.next_id;
        self.next_id += 1;
        Task::new(id, kind, entity, target)
    }

    fn push(&mut self, task: Task) -> TaskId {
        let id = task.id;
        debug!("queued {} #{} for {}", task.kind, id, task.target.name());
        self.tasks.push_back(task);

        // First task starts right away
        if !self.in_flight {
            self.dispatch_head();
        }
        id
    }

    /// Sends the head task to the executor. Failed saves at the head are
    /// finished in place, so this keeps going until a task is out or the
    /// queue is empty. Returns how many tasks finished that way.
    fn dispatch_head(&mut self) -> usize {
        debug_assert!(!self.in_flight);

        let mut finished = 0;
        while let Some(head) = self.tasks.front_mut() {
            if head.kind == TaskKind::Save && !head.succeeded() {
                // Nothing valid to write; finish without touching the target
                if let Some(task) = self.tasks.pop_front() {
                    self.finish(task);
                    finished += 1;
                }
                continue;
            }

            let job = Job {
                id: head.id,
                kind: head.kind,
                target: Arc::clone(&head.target),
                payload: head.payload.take(),
                failure: None,
            };
            debug!(
                "dispatching {} #{} for {} on {}",
                job.kind,
                job.id,
                job.target.name(),
                self.executor.name()
            );
            self.in_flight = true;
            self.executor.dispatch(job);
            break;
        }
        finished
    }

    /// Finishes the head task with the returned `job` and moves on. Returns
    /// how many further tasks finished synchronously.
    fn complete(&mut self, job: Job) -> usize {
        let Some(mut task) = self.tasks.pop_front() else {
            warn!("job #{} came back with an empty queue", job.id);
            return 0;
        };
        debug_assert_eq!(task.id, job.id, "completion out of order");

        task.payload = job.payload;
        task.failure = job.failure;

        if task.kind == TaskKind::Load {
            Self::apply_load(&mut task);
        }

        self.finish(task);
        self.dispatch_head()
    }

    /// Logs the outcome of a popped task and runs the listeners on it.
    ///
    /// A panicking listener is logged and skipped; the queue keeps moving.
    fn finish(&mut self, task: Task) {
        let elapsed = chrono::Local::now() - task.enqueued_at;
        match &task.failure {
            None => info!(
                "{} #{} for {} finished in {}ms",
                task.kind,
                task.id,
                task.target.name(),
                elapsed.num_milliseconds()
            ),
            Some(e) => warn!(
                "{} #{} for {} failed: {}",
                task.kind,
                task.id,
                task.target.name(),
                e
            ),
        }

        for listener in &mut self.listeners {
            if let Err(e) = catch_panic(|| {
                listener(&task);
                Ok(())
            }) {
                warn!("listener for {} #{} failed: {}", task.kind, task.id, e);
            }
        }
    }

    /// Deserializes a finished load into its entity, or resets it on failure
    fn apply_load(task: &mut Task) {
        let Some(entity) = task.entity.as_ref() else {
            return;
        };
        let Ok(mut entity) = entity.try_borrow_mut() else {
            if task.failure.is_none() {
                task.failure = Some(SaveError::EntityBusy);
            }
            return;
        };

        if task.failure.is_some() {
            entity.reset();
            return;
        }
        match task.payload.as_deref() {
            Some(data) => {
                if let Err(e) = deserialize(&mut *entity, data) {
                    task.failure = Some(e);
                }
            }
            None => {
                entity.reset();
                task.failure = Some(SaveError::Corrupted("load returned no data".to_string()));
            }
        }
    }
}

impl Drop for SaveManager {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            warn!(
                "save manager dropped with {} unfinished task(s); call flush() before shutdown",
                self.tasks.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::fields::{TextField, TextSaveCollection};
    use crate::save::saveable::{Binary, BinarySave, ByteReader, ByteWriter, Save};
    use crate::save::target::{FileTarget, MemoryStore, MemoryTarget};
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    struct Player {
        level: i32,
        hp: f32,
    }

    impl Default for Player {
        fn default() -> Self {
            Self { level: 1, hp: 1.0 }
        }
    }

    impl BinarySave for Player {
        fn reset(&mut self) {
            *self = Player::default();
        }

        fn read(&mut self, reader: &mut ByteReader<'_>) -> Result<(), SaveError> {
            self.level = reader.read_i32()?;
            self.hp = reader.read_f32()?;
            Ok(())
        }

        fn write(&self, writer: &mut ByteWriter) -> Result<(), SaveError> {
            if self.level < 0 {
                return Err(SaveError::Corrupted("negative level".to_string()));
            }
            writer.write_i32(self.level);
            writer.write_f32(self.hp);
            Ok(())
        }
    }

    fn player(level: i32, hp: f32) -> Rc<RefCell<Binary<Player>>> {
        Rc::new(RefCell::new(Binary(Player { level, hp })))
    }

    fn encoded(level: i32, hp: f32) -> Vec<u8> {
        Binary(Player { level, hp }).to_bytes().unwrap()
    }

    /// Collects (id, kind, succeeded) for every finished task
    fn record(manager: &mut SaveManager) -> Rc<RefCell<Vec<(TaskId, TaskKind, bool)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        manager.on_task_finished(move |task| {
            sink.borrow_mut().push((task.id, task.kind, task.succeeded()));
        });
        log
    }

    /// Ticks like a game loop until the queue drains
    fn tick_until_idle(manager: &mut SaveManager) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while manager.has_pending_tasks() {
            assert!(Instant::now() < deadline, "queue did not drain");
            manager.update();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn managers() -> Vec<SaveManager> {
        vec![
            SaveManager::with_thread_pool(2).unwrap(),
            SaveManager::with_dedicated_worker().unwrap(),
        ]
    }

    #[test]
    fn test_back_to_back_saves_complete_in_order() {
        for mut manager in managers() {
            let store = MemoryStore::new();
            let log = record(&mut manager);
            let a = player(5, 0.5);
            let b = player(9, 0.9);

            let id_a = manager.enqueue_save(a.clone(), Arc::new(MemoryTarget::new(&store, "a")));
            let id_b = manager.enqueue_save(b.clone(), Arc::new(MemoryTarget::new(&store, "b")));

            // Mutations after enqueue must not reach the stored bytes
            a.borrow_mut().level = 77;

            tick_until_idle(&mut manager);

            assert_eq!(
                *log.borrow(),
                vec![(id_a, TaskKind::Save, true), (id_b, TaskKind::Save, true)]
            );
            assert_eq!(store.get("a"), Some(encoded(5, 0.5)));
            assert_eq!(store.get("b"), Some(encoded(9, 0.9)));
        }
    }

    #[test]
    fn test_load_missing_target_resets_entity() {
        for mut manager in managers() {
            let store = MemoryStore::new();
            let log = record(&mut manager);
            let entity = player(40, 0.1);

            manager.enqueue_load(entity.clone(), Arc::new(MemoryTarget::new(&store, "missing")));
            tick_until_idle(&mut manager);

            assert_eq!(log.borrow().len(), 1);
            assert!(!log.borrow()[0].2);
            assert_eq!(entity.borrow().0, Player::default());
        }
    }

    #[test]
    fn test_load_reads_saved_state() {
        let mut manager = SaveManager::with_dedicated_worker().unwrap();
        let store = MemoryStore::new();
        let target: Arc<dyn StorageTarget> = Arc::new(MemoryTarget::new(&store, "slot"));
        let saved = player(12, 0.75);
        let loaded = player(1, 1.0);

        manager.enqueue_save(saved, Arc::clone(&target));
        manager.enqueue_load(loaded.clone(), target);
        tick_until_idle(&mut manager);

        assert_eq!(loaded.borrow().0, Player { level: 12, hp: 0.75 });
    }

    #[test]
    fn test_corrupt_payload_resets_and_reports() {
        let mut manager = SaveManager::with_thread_pool(1).unwrap();
        let store = MemoryStore::new();
        store.insert("slot", vec![1, 2]);
        let failures = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&failures);
        manager.on_task_finished(move |task| {
            sink.borrow_mut().push(task.failure.as_ref().map(|e| e.to_string()));
        });
        let entity = player(30, 3.0);

        manager.enqueue_load(entity.clone(), Arc::new(MemoryTarget::new(&store, "slot")));
        manager.flush();

        assert_eq!(entity.borrow().0, Player::default());
        let failures = failures.borrow();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].as_ref().unwrap().contains("unexpected end of data"));
    }

    #[test]
    fn test_failed_serialization_never_reaches_target() {
        struct CountingTarget {
            writes: AtomicUsize,
        }

        impl StorageTarget for CountingTarget {
            fn name(&self) -> &str {
                "counting"
            }

            fn read(&self) -> Result<Vec<u8>, SaveError> {
                Ok(vec![])
            }

            fn write(&self, _data: &[u8]) -> Result<(), SaveError> {
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }

            fn delete(&self) -> Result<(), SaveError> {
                Ok(())
            }
        }

        let mut manager = SaveManager::with_dedicated_worker().unwrap();
        let log = record(&mut manager);
        let target = Arc::new(CountingTarget {
            writes: AtomicUsize::new(0),
        });
        let bad = player(-1, 0.0);
        let good = player(2, 2.0);

        let bad_id = manager.enqueue_save(bad.clone(), target.clone());
        let good_id = manager.enqueue_save(good, target.clone());
        tick_until_idle(&mut manager);

        assert_eq!(
            *log.borrow(),
            vec![(bad_id, TaskKind::Save, false), (good_id, TaskKind::Save, true)]
        );
        assert_eq!(target.writes.load(Ordering::SeqCst), 1);
        // A failed save leaves the entity alone
        assert_eq!(bad.borrow().level, -1);
    }

    #[test]
    fn test_failed_save_as_only_task_finishes_immediately() {
        let mut manager = SaveManager::with_thread_pool(1).unwrap();
        let log = record(&mut manager);
        let store = MemoryStore::new();

        manager.enqueue_save(player(-3, 0.0), Arc::new(MemoryTarget::new(&store, "slot")));

        assert!(!manager.has_pending_tasks());
        assert_eq!(log.borrow().len(), 1);
        assert!(store.is_empty());
    }

    /// Target whose delete blocks until the test releases it
    struct GatedTarget {
        gate: Arc<Barrier>,
    }

    impl StorageTarget for GatedTarget {
        fn name(&self) -> &str {
            "gated"
        }

        fn read(&self) -> Result<Vec<u8>, SaveError> {
            Ok(vec![])
        }

        fn write(&self, _data: &[u8]) -> Result<(), SaveError> {
            Ok(())
        }

        fn delete(&self) -> Result<(), SaveError> {
            self.gate.wait();
            Ok(())
        }
    }

    #[test]
    fn test_many_failed_saves_behind_in_flight_task() {
        const FAILED: usize = 5000;
        let mut manager = SaveManager::with_dedicated_worker().unwrap();
        let log = record(&mut manager);
        let gate = Arc::new(Barrier::new(2));
        let store = MemoryStore::new();
        let target: Arc<dyn StorageTarget> = Arc::new(MemoryTarget::new(&store, "slot"));

        let delete_id = manager.enqueue_delete(Arc::new(GatedTarget {
            gate: Arc::clone(&gate),
        }));
        for _ in 0..FAILED {
            manager.enqueue_save(player(-1, 0.0), Arc::clone(&target));
        }
        assert_eq!(manager.pending_tasks(), FAILED + 1);

        gate.wait();
        assert_eq!(manager.flush(), FAILED + 1);

        let log = log.borrow();
        assert_eq!(log.len(), FAILED + 1);
        assert_eq!(log[0], (delete_id, TaskKind::Delete, true));
        assert!(log[1..].iter().all(|&(_, kind, ok)| kind == TaskKind::Save && !ok));
        assert!(log.windows(2).all(|pair| pair[0].0 < pair[1].0));
        assert!(store.is_empty());
    }

    #[test]
    fn test_panicking_listener_does_not_stall_queue() {
        let mut manager = SaveManager::with_thread_pool(1).unwrap();
        manager.on_task_finished(|task| {
            if task.id == 1 {
                panic!("listener blew up");
            }
        });
        let log = record(&mut manager);
        let store = MemoryStore::new();

        let first = manager.enqueue_save(player(1, 1.0), Arc::new(MemoryTarget::new(&store, "a")));
        let second = manager.enqueue_save(player(2, 2.0), Arc::new(MemoryTarget::new(&store, "b")));
        tick_until_idle(&mut manager);

        assert_eq!(
            *log.borrow(),
            vec![(first, TaskKind::Save, true), (second, TaskKind::Save, true)]
        );
        assert_eq!(store.get("b"), Some(encoded(2, 2.0)));
    }

    #[test]
    fn test_borrowed_entity_fails_save_without_panicking() {
        let mut manager = SaveManager::with_thread_pool(1).unwrap();
        let log = record(&mut manager);
        let store = MemoryStore::new();
        let entity = player(4, 4.0);

        let guard = entity.borrow_mut();
        manager.enqueue_save(entity.clone(), Arc::new(MemoryTarget::new(&store, "slot")));
        drop(guard);
        manager.flush();

        assert_eq!(log.borrow().len(), 1);
        assert!(!log.borrow()[0].2);
    }

    #[test]
    fn test_delete_then_load_fails() {
        let mut manager = SaveManager::with_dedicated_worker().unwrap();
        let log = record(&mut manager);
        let store = MemoryStore::new();
        store.insert("slot", encoded(3, 3.0));
        let target: Arc<dyn StorageTarget> = Arc::new(MemoryTarget::new(&store, "slot"));
        let entity = player(8, 8.0);

        manager.enqueue_delete(Arc::clone(&target));
        manager.enqueue_load(entity.clone(), target);
        tick_until_idle(&mut manager);

        let log = log.borrow();
        assert_eq!(log[0].1, TaskKind::Delete);
        assert!(log[0].2);
        assert_eq!(log[1].1, TaskKind::Load);
        assert!(!log[1].2);
        assert!(!store.contains("slot"));
        assert_eq!(entity.borrow().0, Player::default());
    }

    #[test]
    fn test_listener_sees_loaded_state() {
        let mut manager = SaveManager::with_thread_pool(1).unwrap();
        let store = MemoryStore::new();
        store.insert("slot", encoded(21, 0.5));
        let entity = player(1, 1.0);
        let seen = Rc::new(RefCell::new(None));

        let (watched, sink) = (entity.clone(), Rc::clone(&seen));
        manager.on_task_finished(move |_| {
            *sink.borrow_mut() = Some(watched.borrow().level);
        });
        manager.enqueue_load(entity, Arc::new(MemoryTarget::new(&store, "slot")));
        manager.flush();

        assert_eq!(*seen.borrow(), Some(21));
    }

    #[test]
    fn test_update_is_noop_when_idle() {
        let mut manager = SaveManager::with_thread_pool(1).unwrap();
        assert_eq!(manager.update(), 0);
        assert_eq!(manager.flush(), 0);
        assert!(!manager.has_pending_tasks());
    }

    #[test]
    fn test_pending_counts_queued_tasks() {
        let mut manager = SaveManager::with_dedicated_worker().unwrap();
        let store = MemoryStore::new();

        for i in 0..3 {
            manager.enqueue_save(player(i, 0.0), Arc::new(MemoryTarget::new(&store, "slot")));
        }
        assert_eq!(manager.pending_tasks(), 3);
        assert!(manager.has_pending_tasks());

        assert_eq!(manager.flush(), 3);
        assert_eq!(manager.pending_tasks(), 0);
    }

    /// Records the peak number of concurrent storage calls
    struct ConcurrencyProbe {
        store: MemoryStore,
        key: String,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl ConcurrencyProbe {
        fn enter(&self) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
        }

        fn leave(&self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl StorageTarget for ConcurrencyProbe {
        fn name(&self) -> &str {
            &self.key
        }

        fn read(&self) -> Result<Vec<u8>, SaveError> {
            self.enter();
            let result = MemoryTarget::new(&self.store, &self.key).read();
            self.leave();
            result
        }

        fn write(&self, data: &[u8]) -> Result<(), SaveError> {
            self.enter();
            let result = MemoryTarget::new(&self.store, &self.key).write(data);
            self.leave();
            result
        }

        fn delete(&self) -> Result<(), SaveError> {
            self.enter();
            let result = MemoryTarget::new(&self.store, &self.key).delete();
            self.leave();
            result
        }
    }

    #[test]
    fn test_only_one_task_in_flight() {
        for mut manager in [
            SaveManager::with_thread_pool(4).unwrap(),
            SaveManager::with_dedicated_worker().unwrap(),
        ] {
            let store = MemoryStore::new();
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let entity = player(1, 1.0);

            for i in 0..12 {
                let target = Arc::new(ConcurrencyProbe {
                    store: store.clone(),
                    key: format!("slot_{}", i % 3),
                    active: Arc::clone(&active),
                    peak: Arc::clone(&peak),
                });
                match i % 3 {
                    0 => manager.enqueue_save(entity.clone(), target),
                    1 => manager.enqueue_load(entity.clone(), target),
                    _ => manager.enqueue_delete(target),
                };
            }
            tick_until_idle(&mut manager);

            assert_eq!(peak.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_text_settings_through_file_target() {
        let dir = tempdir().unwrap();
        let target: Arc<dyn StorageTarget> =
            Arc::new(FileTarget::new(dir.path(), "config/settings.txt").unwrap());
        let quality = Rc::new(RefCell::new(2));
        let volume = Rc::new(RefCell::new(0.5f32));
        let settings = Rc::new(RefCell::new(
            TextSaveCollection::new()
                .with("A", TextField::parsed(Rc::clone(&quality), 0))
                .with("B", TextField::parsed(Rc::clone(&volume), 1.0)),
        ));

        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/settings.txt"), "A: 1\n").unwrap();

        let mut manager = SaveManager::with_dedicated_worker().unwrap();
        manager.enqueue_load(settings.clone(), Arc::clone(&target));
        manager.flush();

        assert_eq!(*quality.borrow(), 1);
        assert_eq!(*volume.borrow(), 1.0);

        *volume.borrow_mut() = 0.25;
        manager.enqueue_save(settings, target);
        manager.shutdown();

        let text = std::fs::read_to_string(dir.path().join("config/settings.txt")).unwrap();
        assert_eq!(text, "A: 1\nB: 0.25\n");
    }

    #[test]
    fn test_independent_managers_share_a_pool() {
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        let mut game = SaveManager::new(ThreadPoolExecutor::with_pool(Arc::clone(&pool)));
        let mut settings = SaveManager::new(ThreadPoolExecutor::with_pool(pool));
        let store = MemoryStore::new();

        game.enqueue_save(player(3, 0.3), Arc::new(MemoryTarget::new(&store, "game")));
        settings.enqueue_save(player(4, 0.4), Arc::new(MemoryTarget::new(&store, "settings")));
        game.flush();
        settings.flush();

        assert_eq!(store.get("game"), Some(encoded(3, 0.3)));
        assert_eq!(store.get("settings"), Some(encoded(4, 0.4)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Save(i32),
        Load,
        Delete,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..100i32).prop_map(Op::Save),
            Just(Op::Load),
            Just(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_completions_follow_enqueue_order(ops in prop::collection::vec(op(), 1..16)) {
            let mut manager = SaveManager::with_dedicated_worker().unwrap();
            let log = record(&mut manager);
            let store = MemoryStore::new();
            let entity = player(1, 1.0);
            let target: Arc<dyn StorageTarget> = Arc::new(MemoryTarget::new(&store, "slot"));

            let mut expected = Vec::new();
            for op in &ops {
                let id = match op {
                    Op::Save(level) => {
                        entity.borrow_mut().level = *level;
                        manager.enqueue_save(entity.clone(), Arc::clone(&target))
                    }
                    Op::Load => manager.enqueue_load(entity.clone(), Arc::clone(&target)),
                    Op::Delete => manager.enqueue_delete(Arc::clone(&target)),
                };
                expected.push(id);
                // Occasionally let the queue make progress mid-stream
                manager.update();
            }
            tick_until_idle(&mut manager);

            let finished: Vec<TaskId> = log.borrow().iter().map(|(id, _, _)| *id).collect();
            prop_assert_eq!(finished, expected);
        }
    }
}
