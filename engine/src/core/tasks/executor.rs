use crossbeam::{
    channel::{Sender, unbounded},
    sync::WaitGroup,
};
use std::{
    any::Any,
    marker::PhantomData,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, OnceLock},
    thread,
};

type Task = Box<dyn FnOnce() + Send + 'static>;

type Panic = Box<dyn Any + Send + 'static>;

/// A fork-join worker pool.
///
/// Tasks are submitted through a channel and picked up by whichever worker is idle. Concurrent
/// iteration uses [`Executor::scope`] to run borrowed work and wait for all of it.
pub struct Executor {
    sender: Sender<Message>,
    workers: Vec<Worker>,
}

enum Message {
    Task(Task),
    Shutdown,
}

struct Worker {
    handle: Option<thread::JoinHandle<()>>,
}

impl Executor {
    /// Creates a new executor with the specified number of worker threads.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Thread pool size must be greater than 0");

        let (sender, receiver) = unbounded();
        let workers = (0..size).map(|_| Worker::new(receiver.clone())).collect();

        Executor { sender, workers }
    }

    /// The process-wide pool, sized to the available parallelism.
    pub fn global() -> &'static Executor {
        static GLOBAL: OnceLock<Executor> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let size = thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4);
            log::debug!("starting global executor with {} workers", size);
            Executor::new(size)
        })
    }

    /// Executes a detached task on the pool.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(f));
    }

    fn submit(&self, task: Task) {
        // Workers only stop when the executor is dropped, so the channel is connected.
        let _ = self.sender.send(Message::Task(task));
    }

    /// Returns the number of worker threads in the pool.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Creates a scope for spawning tasks that borrow from the caller.
    ///
    /// Every task spawned within the scope has finished when this returns. If a task panicked, the
    /// panic is resumed on the calling thread after all tasks finished.
    ///
    /// # Example
    /// ```ignore
    /// let mut data = vec![1, 2, 3, 4];
    /// executor.scope(|s| {
    ///     for item in &mut data {
    ///         s.spawn(|| {
    ///             *item *= 2;
    ///         });
    ///     }
    /// });
    /// assert_eq!(data, vec![2, 4, 6, 8]);
    /// ```
    pub fn scope<'env, F, R>(&'env self, f: F) -> R
    where
        F: FnOnce(&Scope<'env>) -> R,
    {
        let scope = Scope {
            executor: self,
            wait_group: Some(WaitGroup::new()),
            panic: Arc::new(Mutex::new(None)),
            _phantom: PhantomData,
        };

        let result = f(&scope);
        if let Some(payload) = scope.join() {
            panic::resume_unwind(payload);
        }
        result
    }
}

/// A scope for spawning tasks that can borrow non-'static data.
/// All tasks spawned within the scope are guaranteed to complete before the scope ends.
pub struct Scope<'env> {
    executor: &'env Executor,
    wait_group: Option<WaitGroup>,
    panic: Arc<Mutex<Option<Panic>>>,
    _phantom: PhantomData<std::cell::Cell<&'env ()>>,
}

impl<'env> Scope<'env> {
    /// Spawns a scoped task that can access data from the environment.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'env,
    {
        let Some(wait_group) = self.wait_group.clone() else {
            return;
        };
        let panic = Arc::clone(&self.panic);
        let task: Box<dyn FnOnce() + Send + 'env> = Box::new(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
                panic.lock().unwrap().get_or_insert(payload);
            }
            drop(wait_group);
        });
        // SAFETY: The scope waits for every task before the borrowed environment can end, both in
        // `join` and when dropped during unwinding.
        let task: Task = unsafe { std::mem::transmute(task) };
        self.executor.submit(task);
    }

    fn wait(&mut self) {
        if let Some(wait_group) = self.wait_group.take() {
            wait_group.wait();
        }
    }

    fn join(mut self) -> Option<Panic> {
        self.wait();
        self.panic.lock().unwrap().take()
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.wait();
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Message::Shutdown);
        }

        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Worker {
    fn new(receiver: crossbeam::channel::Receiver<Message>) -> Self {
        let handle = thread::spawn(move || {
            while let Ok(Message::Task(task)) = receiver.recv() {
                task();
            }
        });

        Worker {
            handle: Some(handle),
        }
    }
}
