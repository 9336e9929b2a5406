//! Demo items dispatched by the CLI.

use kickoff_core::{Candidate, CapabilityCheck, StartError, StartResult, Startable};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Kinds of demo values the CLI can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DemoKind {
    /// A number that squares itself
    Number,
    /// A greeting
    Greeting,
    /// An async task spawned on the runtime
    Task,
    /// A plain note with no start capability
    Note,
}

/// Squares its value on start, or refuses if marked unlucky
#[derive(Debug)]
pub struct NumberItem {
    pub value: u64,
    pub unlucky: bool,
}

impl Startable for NumberItem {
    fn start(&self) -> StartResult {
        if self.unlucky {
            return Err(StartError::failed(format!("{} is unlucky", self.value)));
        }
        let square = self
            .value
            .checked_mul(self.value)
            .ok_or_else(|| StartError::failed(format!("square of {} overflows u64", self.value)))?;
        tracing::info!(value = self.value, square, "number");
        Ok(())
    }

    fn label(&self) -> String {
        format!("number-{}", self.value)
    }
}

/// Says hi to someone
#[derive(Debug)]
pub struct SayHiItem {
    pub name: String,
}

impl Startable for SayHiItem {
    fn start(&self) -> StartResult {
        tracing::info!(name = %self.name, "hi");
        Ok(())
    }

    fn label(&self) -> String {
        format!("hi-{}", self.name)
    }
}

/// Handles of tasks spawned by [`TaskItem`]s
#[derive(Clone, Default)]
pub struct TaskList(Arc<Mutex<Vec<JoinHandle<u64>>>>);

impl TaskList {
    /// Wait for every spawned task, returning the ids of those that completed
    pub async fn wait_all(&self) -> Vec<u64> {
        let handles = std::mem::take(&mut *self.0.lock());
        futures::future::join_all(handles)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }
}

/// Spawns an async task on start and returns without waiting for it
pub struct TaskItem {
    pub id: u64,
    pub delay: Duration,
    runtime: Handle,
    tasks: TaskList,
}

impl TaskItem {
    pub fn new(id: u64, delay: Duration, runtime: Handle, tasks: TaskList) -> Self {
        Self {
            id,
            delay,
            runtime,
            tasks,
        }
    }
}

impl Startable for TaskItem {
    fn start(&self) -> StartResult {
        let (id, delay) = (self.id, self.delay);
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!(task = id, "task finished");
            id
        });
        self.tasks.0.lock().push(handle);
        Ok(())
    }

    fn label(&self) -> String {
        format!("task-{}", self.id)
    }
}

/// A value with no start capability
#[derive(Debug)]
pub struct Note;

/// What a run should contain
#[derive(Debug, Clone, Copy)]
pub struct Plan {
    pub numbers: u64,
    pub greetings: u64,
    pub tasks: u64,
    pub task_delay: Duration,
    pub fail_every: Option<u64>,
}

const NAMES: [&str; 5] = ["ada", "grace", "linus", "barbara", "ken"];

/// Build the items for a run, numbers first, then greetings, then tasks
pub fn build(plan: &Plan, runtime: &Handle, tasks: &TaskList) -> Vec<Arc<dyn Startable>> {
    let mut items: Vec<Arc<dyn Startable>> = Vec::new();
    for value in 1..=plan.numbers {
        let unlucky = plan.fail_every.is_some_and(|n| n > 0 && value % n == 0);
        items.push(Arc::new(NumberItem { value, unlucky }));
    }
    for i in 0..plan.greetings {
        let name = NAMES[(i as usize) % NAMES.len()];
        items.push(Arc::new(SayHiItem {
            name: format!("{name}-{i}"),
        }));
    }
    for id in 0..plan.tasks {
        items.push(Arc::new(TaskItem::new(
            id,
            plan.task_delay,
            runtime.clone(),
            tasks.clone(),
        )));
    }
    items
}

/// Capability check that admits every startable demo type
pub fn capability_check() -> CapabilityCheck {
    CapabilityCheck::new()
        .with::<NumberItem>()
        .with::<SayHiItem>()
        .with::<TaskItem>()
}

/// Build a type-erased value of the given kind
pub fn candidate(kind: DemoKind, index: u64, runtime: &Handle, tasks: &TaskList) -> Candidate {
    let candidate = match kind {
        DemoKind::Number => Candidate::new(NumberItem {
            value: index,
            unlucky: false,
        }),
        DemoKind::Greeting => Candidate::new(SayHiItem {
            name: format!("guest-{index}"),
        }),
        DemoKind::Task => Candidate::new(TaskItem::new(
            index,
            Duration::ZERO,
            runtime.clone(),
            tasks.clone(),
        )),
        DemoKind::Note => Candidate::new(Note),
    };
    candidate.with_label(format!("{kind:?}#{index}").to_lowercase())
}
