//! Operation log types
//!
//! An operation is a durable multi-step administrative action: a FIFO of
//! tasks, each executed as one RPC against one tablet. Tasks are plain data
//! ([`TaskKind`]); the engine resolves the tablet client at submit time, so
//! an op can be persisted and resumed by a different leader.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Status of a single task, as reported back by the tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Doing,
    Done,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Doing => write!(f, "doing"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(crate::Error::Internal(format!(
                "unknown task status: {}",
                other
            ))),
        }
    }
}

/// Kind of operation, for bookkeeping and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    MakeSnapshot,
    CreateTable,
}

/// Discriminant of a task, matched against tablet status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    MakeSnapshot,
    CreateTable,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::MakeSnapshot => write!(f, "make_snapshot"),
            TaskType::CreateTable => write!(f, "create_table"),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "make_snapshot" => Ok(TaskType::MakeSnapshot),
            "create_table" => Ok(TaskType::CreateTable),
            other => Err(crate::Error::Internal(format!(
                "unknown task type: {}",
                other
            ))),
        }
    }
}

/// What a task does on its target tablet. Serializable so in-flight ops
/// survive leader transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    MakeSnapshot {
        tid: u32,
        pid: u32,
    },
    CreateTable {
        name: String,
        tid: u32,
        pid: u32,
        ttl: u64,
        is_leader: bool,
        replicas: Vec<String>,
    },
}

impl TaskKind {
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskKind::MakeSnapshot { .. } => TaskType::MakeSnapshot,
            TaskKind::CreateTable { .. } => TaskType::CreateTable,
        }
    }
}

/// One step of an operation, bound to one tablet endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub op_id: u64,
    pub op_type: OpType,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub endpoint: String,
}

/// An in-flight operation. The head of `tasks` is the step currently being
/// driven; the op is complete once the FIFO is empty.
#[derive(Debug, Clone)]
pub struct OpData {
    pub op_id: u64,
    pub op_type: OpType,
    /// The admin request that created the op, for observability and replay.
    pub data: serde_json::Value,
    pub tasks: VecDeque<Task>,
}

/// Durable form of an [`OpData`]: the remaining task list. Rewritten on
/// every head advance so a new leader resumes at the correct step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpRecord {
    pub op_id: u64,
    pub op_type: OpType,
    pub data: serde_json::Value,
    pub tasks: Vec<Task>,
}

impl OpData {
    pub fn new(op_id: u64, op_type: OpType, data: serde_json::Value) -> Self {
        Self {
            op_id,
            op_type,
            data,
            tasks: VecDeque::new(),
        }
    }

    pub fn head_task_type(&self) -> Option<TaskType> {
        self.tasks.front().map(|t| t.kind.task_type())
    }

    pub fn to_record(&self) -> OpRecord {
        OpRecord {
            op_id: self.op_id,
            op_type: self.op_type,
            data: self.data.clone(),
            tasks: self.tasks.iter().cloned().collect(),
        }
    }

    /// Rebuild from a durable record. Statuses are reset to Doing; the first
    /// poller cycle re-learns true progress from the tablets, which is safe
    /// because tablet RPCs are idempotent per (op_id, task type).
    pub fn from_record(record: OpRecord) -> Self {
        let mut tasks: VecDeque<Task> = record.tasks.into();
        for task in tasks.iter_mut() {
            task.status = TaskStatus::Doing;
        }
        Self {
            op_id: record.op_id,
            op_type: record.op_type,
            data: record.data,
            tasks,
        }
    }
}
