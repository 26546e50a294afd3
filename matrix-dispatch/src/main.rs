//! Matrix Dispatch - 驱动程序入口
//!
//! 读取输入矩阵与主机列表，把计算分发到远程worker，成功后写出结果矩阵

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;

use matrix_dispatch_core::config::{load_config, load_default_config, Settings};
use matrix_dispatch_core::io::{load_hosts, read_matrix, write_matrix, MatrixFormat};
use matrix_dispatch_core::{partition, ExecutionController, Logger, Matrix, MatrixOperation};

/// 未指定 `--config` 时尝试加载的配置文件
const DEFAULT_CONFIG_FILE: &str = "matrix-dispatch.toml";

#[derive(Debug, Parser)]
#[command(name = "matrix-dispatch", version, about = "Distribute matrix computations over remote workers")]
struct Args {
    /// 矩阵A
    #[arg(short = 'A', long = "matrix-a")]
    matrix_a: PathBuf,

    /// 矩阵B（求和类运算可省略）
    #[arg(short = 'B', long = "matrix-b")]
    matrix_b: Option<PathBuf>,

    /// 结果矩阵输出路径
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// 主机列表（JSON字符串数组）
    #[arg(long)]
    hosts: Option<PathBuf>,

    /// 以文本格式输出（默认二进制）
    #[arg(long)]
    txt: bool,

    /// 以二进制格式读取输入（默认文本）
    #[arg(long)]
    bin: bool,

    /// column-sum | row-sum | elementwise-product | product
    #[arg(long, default_value = "product")]
    operation: MatrixOperation,

    /// 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 覆盖 dispatch.rows_per_task
    #[arg(long)]
    rows_per_task: Option<usize>,

    /// 覆盖 dispatch.request_timeout_ms
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("matrix-dispatch: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> anyhow::Result<bool> {
    let settings = load_settings(args.config.as_deref())?;
    Logger::init(&settings.logging).map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let mut dispatch = settings.dispatch.clone();
    if let Some(rows) = args.rows_per_task {
        dispatch.rows_per_task = rows;
    }
    if let Some(millis) = args.timeout_ms {
        dispatch.request_timeout_ms = Some(millis);
    }

    let input_format = if args.bin { MatrixFormat::Binary } else { MatrixFormat::Text };
    let output_format = if args.txt { MatrixFormat::Text } else { MatrixFormat::Binary };

    let a = read_matrix(&args.matrix_a, input_format)
        .with_context(|| format!("failed to read matrix A from {}", args.matrix_a.display()))?;
    let b = match &args.matrix_b {
        Some(path) => read_matrix(path, input_format)
            .with_context(|| format!("failed to read matrix B from {}", path.display()))?,
        None if needs_second_operand(args.operation) => {
            bail!("operation {} needs matrix B (-B)", args.operation)
        }
        None => Matrix::new(0, 0),
    };

    let hosts_path = match args.hosts.or(settings.hosts_file) {
        Some(path) => path,
        None => bail!("no host list given (--hosts or hosts_file)"),
    };
    let nodes = load_hosts(&hosts_path, dispatch.service_port)
        .with_context(|| format!("failed to load hosts from {}", hosts_path.display()))?;

    let (rows, cols) = partition::output_shape(args.operation, &a, &b);
    let mut c = Matrix::new(rows, cols);

    tracing::info!(
        operation = %args.operation,
        a = ?a.shape(),
        b = ?b.shape(),
        nodes = nodes.len(),
        "Starting distributed computation"
    );

    let mut controller = ExecutionController::new(&a, &b, &mut c, &nodes, args.operation).with_config(dispatch);
    if !controller.exec() {
        match controller.last_error() {
            Some(error) => eprintln!("matrix-dispatch: computation failed: {}", error),
            None => eprintln!("matrix-dispatch: computation failed"),
        }
        return Ok(false);
    }
    drop(controller);

    write_matrix(&args.output, &c, output_format)
        .with_context(|| format!("failed to write result to {}", args.output.display()))?;
    tracing::info!(output = %args.output.display(), rows, cols, "Result written");
    Ok(true)
}

/// 显式指定的配置文件必须可用；默认配置文件缺失时只使用环境变量
fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => load_config(path).with_context(|| format!("failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            load_config(DEFAULT_CONFIG_FILE).with_context(|| format!("failed to load config {}", DEFAULT_CONFIG_FILE))
        }
        None => load_default_config().context("failed to load config from environment"),
    }
}

fn needs_second_operand(operation: MatrixOperation) -> bool {
    matches!(operation, MatrixOperation::ElementwiseProduct | MatrixOperation::Product)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "matrix-dispatch",
            "-A",
            "a.txt",
            "-B",
            "b.txt",
            "-o",
            "c.bin",
            "--hosts",
            "hosts.json",
            "--operation",
            "elementwise-product",
            "--rows-per-task",
            "3",
        ])
        .unwrap();
        assert_eq!(args.matrix_a, PathBuf::from("a.txt"));
        assert_eq!(args.operation, MatrixOperation::ElementwiseProduct);
        assert_eq!(args.rows_per_task, Some(3));
        assert!(!args.txt && !args.bin);
    }

    #[test]
    fn test_args_defaults_and_errors() {
        let args = Args::try_parse_from(["matrix-dispatch", "-A", "a", "-o", "c", "--txt"]).unwrap();
        assert_eq!(args.operation, MatrixOperation::Product);
        assert!(args.matrix_b.is_none());
        assert!(args.txt);

        assert!(Args::try_parse_from(["matrix-dispatch", "-o", "c"]).is_err());
        assert!(Args::try_parse_from(["matrix-dispatch", "-A", "a", "-o", "c", "--operation", "divide"]).is_err());
    }

    #[test]
    fn test_second_operand() {
        assert!(needs_second_operand(MatrixOperation::Product));
        assert!(!needs_second_operand(MatrixOperation::ColumnSum));
    }
}
