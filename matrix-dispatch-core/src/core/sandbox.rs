//! 执行控制器
//!
//! 为一次分布式矩阵计算提供同步的调用接口：`exec()` 在独立线程中运行
//! 编排流程（分区、分发、等待、合并），调用方阻塞直到进入终态。
//!
//! 编排线程是作用域线程，`exec()` 返回前一定已被join，
//! 因此后台不会在返回后继续访问调用方的矩阵。

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::error::{DispatchError, Result};
use super::logging::PerformanceLogger;
use super::matrix::Matrix;
use super::node::ComputeNode;
use super::partition::{self, Plan, RoundRobin, SubTask};
use super::protocol::DEFAULT_SERVICE_PORT;
use super::types::{ExecutionState, MatrixOperation, NumericVector};

/// 分发配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 节点服务端口（主机列表未指定端口时使用）
    pub service_port: u16,
    /// 逐元素相乘时每个子任务包含的行数
    pub rows_per_task: usize,
    /// 单次调用期限（毫秒），默认不限
    pub request_timeout_ms: Option<u64>,
    /// 调用运行时的工作线程数，默认由tokio决定
    pub runtime_worker_threads: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            service_port: DEFAULT_SERVICE_PORT,
            rows_per_task: 1,
            request_timeout_ms: None,
            runtime_worker_threads: None,
        }
    }
}

impl DispatchConfig {
    fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

type SharedState = Arc<RwLock<ExecutionState>>;

fn read_state(state: &SharedState) -> ExecutionState {
    *state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(state: &SharedState, value: ExecutionState) {
    *state.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// 完成信号的发送端，由编排流程持有
///
/// `terminate` 会消费自身，因此每次执行最多解析一次。
/// 未调用 `terminate` 就被丢弃时，调用方观察到的是失败
pub struct Completion {
    sender: oneshot::Sender<Result<()>>,
    state: SharedState,
}

impl Completion {
    fn new(state: SharedState) -> (Self, oneshot::Receiver<Result<()>>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender, state }, receiver)
    }

    /// 进入终态并唤醒等待中的调用方
    pub fn terminate(self, result: Result<()>) {
        let terminal = if result.is_ok() {
            ExecutionState::Completed
        } else {
            ExecutionState::Failed
        };
        write_state(&self.state, terminal);

        if self.sender.send(result).is_err() {
            tracing::warn!("Completion signalled but the caller is no longer waiting");
        }
    }
}

/// 执行控制器
///
/// 持有输入矩阵的共享引用、输出矩阵的独占引用以及节点列表，
/// 生命周期覆盖整个 `exec()` 调用
pub struct ExecutionController<'a> {
    a: &'a Matrix,
    b: &'a Matrix,
    c: &'a mut Matrix,
    nodes: &'a [ComputeNode],
    operation: MatrixOperation,
    config: DispatchConfig,
    state: SharedState,
    last_error: Option<DispatchError>,
    execution_id: String,
}

impl<'a> ExecutionController<'a> {
    /// 创建新的执行控制器
    pub fn new(
        a: &'a Matrix,
        b: &'a Matrix,
        c: &'a mut Matrix,
        nodes: &'a [ComputeNode],
        operation: MatrixOperation,
    ) -> Self {
        Self {
            a,
            b,
            c,
            nodes,
            operation,
            config: DispatchConfig::default(),
            state: Arc::new(RwLock::new(ExecutionState::Idle)),
            last_error: None,
            execution_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 设置分发配置
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// 执行并阻塞直到完成或失败
    ///
    /// 只能在 `Idle` 状态下调用一次，重复调用不会再次执行，直接返回 `false`。
    /// 必须在同步上下文中调用，在tokio运行时内部调用会以 `Runtime` 错误失败。
    /// 返回 `false` 时输出矩阵不应被视为有效结果
    pub fn exec(&mut self) -> bool {
        let current = read_state(&self.state);
        if current != ExecutionState::Idle {
            tracing::error!(
                execution_id = %self.execution_id,
                state = ?current,
                "exec() called on a controller that is not idle"
            );
            return false;
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            let error = DispatchError::Runtime {
                message: "exec() must not be called from within a tokio runtime".to_string(),
            };
            error.log();
            write_state(&self.state, ExecutionState::Failed);
            self.last_error = Some(error);
            return false;
        }
        write_state(&self.state, ExecutionState::Running);

        let (completion, receiver) = Completion::new(Arc::clone(&self.state));
        let job = Job {
            a: self.a,
            b: self.b,
            c: &mut *self.c,
            nodes: self.nodes,
            operation: self.operation,
            config: &self.config,
            execution_id: &self.execution_id,
        };

        let signalled = std::thread::scope(|scope| {
            let routine = std::thread::Builder::new()
                .name("dispatch-sandbox".to_string())
                .spawn_scoped(scope, move || job.run(completion));
            if let Err(e) = &routine {
                tracing::error!("Failed to start orchestration routine: {}", e);
            }

            let signalled = receiver.blocking_recv();

            if let Ok(handle) = routine {
                if handle.join().is_err() {
                    tracing::error!(execution_id = %self.execution_id, "Orchestration routine panicked");
                }
            }
            signalled
        });

        let result = signalled.unwrap_or_else(|_| {
            Err(DispatchError::Runtime {
                message: "orchestration routine ended without signalling completion".to_string(),
            })
        });

        match result {
            Ok(()) => true,
            Err(error) => {
                write_state(&self.state, ExecutionState::Failed);
                self.last_error = Some(error);
                false
            }
        }
    }

    /// 是否已进入终态（执行中为参考值）
    pub fn is_finished(&self) -> bool {
        read_state(&self.state).outcome().completed
    }

    /// 是否失败（执行中为参考值）
    pub fn has_error(&self) -> bool {
        read_state(&self.state).outcome().failed
    }

    /// 当前状态
    pub fn state(&self) -> ExecutionState {
        read_state(&self.state)
    }

    /// 失败原因
    pub fn last_error(&self) -> Option<&DispatchError> {
        self.last_error.as_ref()
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }
}

/// 便捷入口：用给定配置执行一次分布式计算
pub fn execute(
    a: &Matrix,
    b: &Matrix,
    c: &mut Matrix,
    nodes: &[ComputeNode],
    operation: MatrixOperation,
    config: DispatchConfig,
) -> bool {
    ExecutionController::new(a, b, c, nodes, operation)
        .with_config(config)
        .exec()
}

/// 一次执行在编排线程上所需的全部借用
struct Job<'s> {
    a: &'s Matrix,
    b: &'s Matrix,
    c: &'s mut Matrix,
    nodes: &'s [ComputeNode],
    operation: MatrixOperation,
    config: &'s DispatchConfig,
    execution_id: &'s str,
}

impl Job<'_> {
    fn run(self, completion: Completion) {
        let execution_id = self.execution_id;
        let operation = self.operation;
        let span = tracing::info_span!("execution", execution_id, operation = %operation);
        let _enter = span.enter();

        let started = Instant::now();
        let result = self.orchestrate();

        let sub_tasks = match &result {
            Ok(count) => *count,
            Err(error) => {
                error.log();
                0
            }
        };
        PerformanceLogger::record_execution(
            execution_id,
            operation.name(),
            sub_tasks,
            started.elapsed(),
            result.is_ok(),
        );

        completion.terminate(result.map(|_| ()));
    }

    /// 编排流程，返回分发的子任务总数
    fn orchestrate(self) -> Result<usize> {
        let mut selector = RoundRobin::new(self.nodes)?;
        partition::validate_shapes(self.operation, self.a, self.b, &*self.c)?;

        let plan = partition::partition(self.operation, self.a, self.b, self.config.rows_per_task);
        tracing::info!(
            nodes = selector.len(),
            sub_tasks = plan.first_phase().len(),
            "Dispatching {}",
            self.operation
        );

        let runtime = build_runtime(self.config)?;
        let executed = runtime.block_on(execute_plan(plan, &mut selector, self.config.request_timeout()));
        // 调用任务全部结束后才写输出矩阵
        drop(runtime);
        let (tasks, results, dispatched) = executed?;

        partition::merge(self.c, &tasks, &results)?;
        Ok(dispatched)
    }
}

fn build_runtime(config: &DispatchConfig) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("dispatch-invoke");
    if let Some(threads) = config.runtime_worker_threads {
        builder.worker_threads(threads.max(1));
    }
    builder.build().map_err(|e| DispatchError::Runtime {
        message: format!("failed to build invocation runtime: {}", e),
    })
}

/// 按计划分发，返回最终要合并的子任务、对应结果以及分发总数
async fn execute_plan(
    plan: Plan,
    selector: &mut RoundRobin<'_>,
    deadline: Option<Duration>,
) -> Result<(Vec<SubTask>, Vec<NumericVector>, usize)> {
    match plan {
        Plan::Single(tasks) => {
            let results = dispatch_all(&tasks, selector, deadline).await?;
            let dispatched = tasks.len();
            Ok((tasks, results, dispatched))
        }
        Plan::Product { multiply, inner, cols } => {
            let products = dispatch_all(&multiply, selector, deadline).await?;
            let sums = partition::product_sum_phase(&multiply, &products, inner, cols)?;
            tracing::debug!(sub_tasks = sums.len(), "Multiply phase complete, dispatching sums");
            let results = dispatch_all(&sums, selector, deadline).await?;
            let dispatched = multiply.len() + sums.len();
            Ok((sums, results, dispatched))
        }
    }
}

/// 并发分发一组子任务并等待全部完成
///
/// 完成顺序任意；第一个失败会取消其余调用并立即返回
async fn dispatch_all(
    tasks: &[SubTask],
    selector: &mut RoundRobin<'_>,
    deadline: Option<Duration>,
) -> Result<Vec<NumericVector>> {
    let mut in_flight = FuturesUnordered::new();
    let mut abort_handles = Vec::with_capacity(tasks.len());

    for (position, task) in tasks.iter().enumerate() {
        let node = selector.next_node();
        let pending = match node.invoke_with_timeout(task.operation, task.payload.clone(), deadline) {
            Ok(pending) => pending,
            Err(source) => {
                abort_handles.iter().for_each(tokio::task::AbortHandle::abort);
                return Err(failure(node, task, source));
            }
        };
        abort_handles.push(pending.abort_handle());

        let started = Instant::now();
        in_flight.push(async move { (position, node, pending.await, started.elapsed()) });
    }

    let mut results: Vec<Option<NumericVector>> = vec![None; tasks.len()];
    while let Some((position, node, outcome, elapsed)) = in_flight.next().await {
        let task = &tasks[position];
        match outcome {
            Ok(values) => {
                PerformanceLogger::record_invocation(node.name(), task.operation.path(), task.index, elapsed);
                tracing::debug!(node = node.name(), task = task.index, ?values, "Sub-task resolved");
                results[position] = Some(values);
            }
            Err(source) => {
                abort_handles.iter().for_each(tokio::task::AbortHandle::abort);
                return Err(failure(node, task, source));
            }
        }
    }

    results.into_iter().collect::<Option<Vec<_>>>().ok_or_else(|| DispatchError::Runtime {
        message: "a sub-task finished without a result".to_string(),
    })
}

fn failure(node: &ComputeNode, task: &SubTask, source: super::error::NodeError) -> DispatchError {
    DispatchError::ExecutionFailure {
        node: node.name().to_string(),
        operation: task.operation,
        task: task.index,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_sets_terminal_state() {
        let state: SharedState = Arc::new(RwLock::new(ExecutionState::Running));
        let (completion, mut receiver) = Completion::new(Arc::clone(&state));
        completion.terminate(Err(DispatchError::NoNodesAvailable { supplied: 0 }));
        assert_eq!(read_state(&state), ExecutionState::Failed);
        assert!(matches!(receiver.try_recv(), Ok(Err(DispatchError::NoNodesAvailable { .. }))));
    }

    #[test]
    fn test_dropped_completion_reports_closed() {
        let state: SharedState = Arc::new(RwLock::new(ExecutionState::Running));
        let (completion, mut receiver) = Completion::new(state);
        drop(completion);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_exec_without_nodes_fails() {
        let a = Matrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let b = a.clone();
        let mut c = Matrix::new(1, 1);
        let mut controller = ExecutionController::new(&a, &b, &mut c, &[], MatrixOperation::ColumnSum);

        assert!(!controller.is_finished());
        assert!(!controller.exec());
        assert!(controller.is_finished());
        assert!(controller.has_error());
        assert_eq!(controller.state(), ExecutionState::Failed);
        assert!(matches!(
            controller.last_error(),
            Some(DispatchError::NoNodesAvailable { supplied: 0 })
        ));
    }

    #[test]
    fn test_exec_twice_does_not_rerun() {
        let a = Matrix::new(1, 1);
        let b = Matrix::new(1, 1);
        let mut c = Matrix::new(1, 1);
        let nodes = vec![ComputeNode::invalid()];
        let mut controller = ExecutionController::new(&a, &b, &mut c, &nodes, MatrixOperation::RowSum);
        assert!(!controller.exec());
        let first = controller.last_error().cloned();
        assert!(!controller.exec());
        assert_eq!(controller.last_error().cloned(), first);
    }

    #[tokio::test]
    async fn test_exec_inside_runtime_fails_without_blocking() {
        let a = Matrix::new(1, 1);
        let b = Matrix::new(1, 1);
        let mut c = Matrix::new(1, 1);
        let nodes = vec![ComputeNode::with_port("127.0.0.1", 1)];
        let mut controller = ExecutionController::new(&a, &b, &mut c, &nodes, MatrixOperation::RowSum);
        assert!(!controller.exec());
        assert_eq!(controller.state(), ExecutionState::Failed);
        assert!(matches!(controller.last_error(), Some(DispatchError::Runtime { .. })));
    }

    #[test]
    fn test_shape_mismatch_fails_before_dispatch() {
        let a = Matrix::new(2, 2);
        let b = Matrix::new(3, 3);
        let mut c = Matrix::new(2, 2);
        // 端口1上没有服务，若真的发起调用会得到连接错误而不是形状错误
        let nodes = vec![ComputeNode::with_port("127.0.0.1", 1)];
        let mut controller =
            ExecutionController::new(&a, &b, &mut c, &nodes, MatrixOperation::ElementwiseProduct);
        assert!(!controller.exec());
        assert!(matches!(controller.last_error(), Some(DispatchError::ShapeMismatch { .. })));
    }
}
