//! Fixed-size worker pool scheduling tasks through a dependency DAG.
//!
//! Each submitted task carries outgoing edges ("tasks that depend on me") and
//! an atomic remaining-dependency counter. Two queues separate tasks that are
//! ready to run (counter == 0) from tasks still waiting on a dependency.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Unit of work submitted to a [`ThreadPool`]. `run` executes on exactly one
/// worker thread, sequentially with respect to itself.
pub trait Task: Send + 'static {
    fn run(&mut self);
}

impl<F: FnMut() + Send + 'static> Task for F {
    fn run(&mut self) {
        (self)()
    }
}

struct TaskNode {
    task: Box<dyn Task>,
    remaining: AtomicUsize,
    dependents: Vec<usize>,
}

struct Shared {
    nodes: Mutex<Vec<Option<TaskNode>>>,
    ready: Mutex<VecDeque<usize>>,
    not_ready: Mutex<Vec<usize>>,
    condvar: Condvar,
    pending: AtomicUsize,
    exit: AtomicUsize,
}

/// A graph of tasks being built up before submission. Call [`TaskGraph::push`]
/// to add a task and record its dependencies, then [`ThreadPool::submit_graph`]
/// to hand the whole batch to the pool.
#[derive(Default)]
pub struct TaskGraph {
    tasks: Vec<(Box<dyn Task>, Vec<usize>)>,
}

impl TaskGraph {
    pub fn new() -> Self {
        TaskGraph { tasks: Vec::new() }
    }

    /// Adds a task depending on the given previously-pushed task indices,
    /// returning this task's own index for use as a future dependency.
    pub fn push(&mut self, task: impl Task, depends_on: &[usize]) -> usize {
        self.tasks.push((Box::new(task), depends_on.to_vec()));
        self.tasks.len() - 1
    }
}

/// A fixed-size worker pool executing a [`TaskGraph`]: workers block on an
/// empty ready queue, rescanning the not-ready queue before each block so a
/// dependency cleared between wakeups is never missed.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<std::thread::JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> Self {
        let shared = Arc::new(Shared {
            nodes: Mutex::new(Vec::new()),
            ready: Mutex::new(VecDeque::new()),
            not_ready: Mutex::new(Vec::new()),
            condvar: Condvar::new(),
            pending: AtomicUsize::new(0),
            exit: AtomicUsize::new(0),
        });

        let workers = (0..num_threads.max(1))
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || worker_loop(shared))
            })
            .collect();

        ThreadPool { shared, workers }
    }

    /// Submits every task in `graph`, notifying a worker for each task whose
    /// dependencies are already satisfied.
    pub fn submit_graph(&self, graph: TaskGraph) {
        let mut nodes = self.shared.nodes.lock().unwrap();
        let base = nodes.len();
        let mut ready_now = Vec::new();
        let mut not_ready_now = Vec::new();

        for (task, deps) in graph.tasks {
            let index = nodes.len();
            nodes.push(Some(TaskNode {
                task,
                remaining: AtomicUsize::new(deps.len()),
                dependents: Vec::new(),
            }));
            for &dep in &deps {
                nodes[base + dep].as_mut().unwrap().dependents.push(index);
            }
            if deps.is_empty() {
                ready_now.push(index);
            } else {
                not_ready_now.push(index);
            }
        }
        drop(nodes);

        self.shared.pending.fetch_add(
            ready_now.len() + not_ready_now.len(),
            Ordering::SeqCst,
        );

        self.shared.ready.lock().unwrap().extend(ready_now);
        self.shared.not_ready.lock().unwrap().extend(not_ready_now);
        self.shared.condvar.notify_all();
    }

    /// Submits a single dependency-free task.
    pub fn submit(&self, task: impl Task) {
        let mut graph = TaskGraph::new();
        graph.push(task, &[]);
        self.submit_graph(graph);
    }

    /// Spins until every submitted task has completed.
    pub fn wait_for_completion(&self) {
        while self.shared.pending.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
        }
    }

    /// Signals every worker to stop after its current task and joins them.
    pub fn exit(mut self) {
        self.shared.exit.store(1, Ordering::SeqCst);
        self.shared.condvar.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let index = match next_task(&shared) {
            Some(i) => i,
            None => return,
        };

        let mut node = {
            let mut nodes = shared.nodes.lock().unwrap();
            nodes[index].take().expect("task slot already taken")
        };
        node.task.run();

        let mut ready = shared.ready.lock().unwrap();
        {
            let nodes = shared.nodes.lock().unwrap();
            for &dependent in &node.dependents {
                if let Some(dep_node) = nodes[dependent].as_ref() {
                    if dep_node.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        ready.push_back(dependent);
                    }
                }
            }
        }
        drop(ready);
        shared.pending.fetch_sub(1, Ordering::SeqCst);
        shared.condvar.notify_all();
    }
}

fn next_task(shared: &Arc<Shared>) -> Option<usize> {
    let mut ready = shared.ready.lock().unwrap();
    loop {
        // Rescan not-ready before blocking: a dependency can clear between
        // the decrementing worker's notify and this worker reaching here.
        {
            let mut not_ready = shared.not_ready.lock().unwrap();
            let nodes = shared.nodes.lock().unwrap();
            not_ready.retain(|&index| {
                let still_waiting = nodes[index]
                    .as_ref()
                    .map(|n| n.remaining.load(Ordering::SeqCst) > 0)
                    .unwrap_or(false);
                if !still_waiting {
                    ready.push_back(index);
                }
                still_waiting
            });
        }

        if let Some(index) = ready.pop_front() {
            return Some(index);
        }

        if shared.exit.load(Ordering::SeqCst) != 0 {
            return None;
        }

        ready = shared.condvar.wait(ready).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn independent_tasks_all_run() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let mut graph = TaskGraph::new();
        for _ in 0..20 {
            let counter = counter.clone();
            graph.push(move || { counter.fetch_add(1, Ordering::SeqCst); }, &[]);
        }
        pool.submit_graph(graph);
        pool.wait_for_completion();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        pool.exit();
    }

    #[test]
    fn dependent_task_runs_after_dependency() {
        let pool = ThreadPool::new(2);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut graph = TaskGraph::new();

        let o1 = order.clone();
        let first = graph.push(move || { o1.lock().unwrap().push(1); }, &[]);

        let o2 = order.clone();
        graph.push(move || { o2.lock().unwrap().push(2); }, &[first]);

        pool.submit_graph(graph);
        pool.wait_for_completion();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        pool.exit();
    }

    #[test]
    fn diamond_dependency_resolves() {
        let pool = ThreadPool::new(4);
        let sum = Arc::new(AtomicI32::new(0));
        let mut graph = TaskGraph::new();

        let root = graph.push(|| {}, &[]);
        let s1 = sum.clone();
        let left = graph.push(move || { s1.fetch_add(1, Ordering::SeqCst); }, &[root]);
        let s2 = sum.clone();
        let right = graph.push(move || { s2.fetch_add(10, Ordering::SeqCst); }, &[root]);
        let s3 = sum.clone();
        graph.push(move || { s3.fetch_add(100, Ordering::SeqCst); }, &[left, right]);

        pool.submit_graph(graph);
        pool.wait_for_completion();
        assert_eq!(sum.load(Ordering::SeqCst), 111);
        pool.exit();
    }
}
