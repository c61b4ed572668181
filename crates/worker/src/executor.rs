//! 工具命令执行
//!
//! 命令模板含 `{{value}}` 时对每个输入值各执行一次；否则执行一次，输入值逐行写入stdin。
//! 输出经 [`Normalizer`] 标准化后作为结果提交。

use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};

use recon_core::{
    models::{Job, JobResultPayload, NormalizedResult, ToolDefinition},
    ReconError, ReconResult,
};
use recon_domain::Normalizer;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const VALUE_PLACEHOLDER: &str = "{{value}}";

pub struct CommandExecutor {
    tools: HashMap<String, ToolDefinition>,
    normalizer: Normalizer,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(tools: Vec<ToolDefinition>, timeout: Duration) -> ReconResult<Self> {
        let normalizer = Normalizer::new().with_tools(&tools)?;
        let tools = tools
            .into_iter()
            .map(|tool| (tool.name.clone(), tool))
            .collect();
        Ok(Self {
            tools,
            normalizer,
            timeout,
        })
    }

    /// 执行任务并生成结果载荷；执行失败也会生成载荷（带 error）
    pub async fn execute(&self, job: &Job) -> JobResultPayload {
        let started = Instant::now();
        match self.run(job).await {
            Ok((results, raw)) => {
                info!(
                    job.id = %job.id,
                    tool = %job.tool_name,
                    records = results.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "任务执行完成"
                );
                JobResultPayload::success(results, job.is_save_raw_result.then_some(raw))
            }
            Err(e) => {
                warn!(job.id = %job.id, tool = %job.tool_name, "任务执行失败: {}", e);
                JobResultPayload::failure(e.to_string(), None)
            }
        }
    }

    async fn run(&self, job: &Job) -> ReconResult<(Vec<NormalizedResult>, String)> {
        let tool = self
            .tools
            .get(&job.tool_name)
            .ok_or_else(|| ReconError::ToolNotFound {
                name: job.tool_name.clone(),
            })?;

        let raw = if tool.command.contains(VALUE_PLACEHOLDER) {
            let mut combined = String::new();
            for value in &job.values {
                let command = render_command(&tool.command, value);
                let output = self.run_command(&command, None).await?;
                combined.push_str(&output);
                if !combined.is_empty() && !combined.ends_with('\n') {
                    combined.push('\n');
                }
            }
            combined
        } else {
            let mut input = job.values.join("\n");
            input.push('\n');
            self.run_command(&tool.command, Some(input)).await?
        };

        let results = self
            .normalizer
            .parse_for_values(&tool.name, &raw, &job.values)?;
        Ok((results, raw))
    }

    async fn run_command(&self, command: &str, input: Option<String>) -> ReconResult<String> {
        debug!("执行命令: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| ReconError::Execution(format!("启动命令失败: {e}")))?;

        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), input) {
            // 单独写入，避免输出管道写满时互相等待
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!("写入命令stdin失败: {}", e);
                }
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                output.map_err(|e| ReconError::Execution(format!("等待命令结束失败: {e}")))?
            }
            Err(_) => {
                return Err(ReconError::Execution(format!(
                    "命令执行超时 ({}秒)",
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReconError::Execution(format!(
                "命令退出码 {}: {}",
                output
                    .status
                    .code()
                    .map_or_else(|| "unknown".to_string(), |code| code.to_string()),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// 用单引号转义后的值替换占位符
pub fn render_command(template: &str, value: &str) -> String {
    template.replace(VALUE_PLACEHOLDER, &shell_quote(value))
}

pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use recon_core::models::priority;

    fn tool(name: &str, category: &str, command: &str, parser: &str) -> ToolDefinition {
        ToolDefinition::built_in(name, category, command, parser)
    }

    fn job_for(tool: &ToolDefinition, values: &[&str]) -> Job {
        let mut job = Job::new(tool.id, &tool.name, &tool.category, priority::NORMAL);
        job.values = values.iter().map(|v| v.to_string()).collect();
        job
    }

    #[test]
    fn test_render_command_quotes_value() {
        assert_eq!(
            render_command("naabu -host {{value}}", "a.example.com"),
            "naabu -host 'a.example.com'"
        );
        assert_eq!(
            render_command("echo {{value}}", "x'; rm -rf /; '"),
            r"echo 'x'\''; rm -rf /; '\'''"
        );
    }

    #[tokio::test]
    async fn test_values_are_piped_to_stdin() {
        let subfinder = tool("subfinder", "subdomains", "cat", "subdomains");
        let executor =
            CommandExecutor::new(vec![subfinder.clone()], Duration::from_secs(5)).unwrap();

        let mut job = job_for(&subfinder, &["a.example.com", "b.example.com"]);
        job.is_save_raw_result = true;
        let payload = executor.execute(&job).await;

        assert!(!payload.is_failure());
        assert_eq!(payload.results.map(|r| r.len()), Some(2));
        assert_eq!(
            payload.output.as_deref(),
            Some("a.example.com\nb.example.com\n")
        );
    }

    #[tokio::test]
    async fn test_placeholder_runs_once_per_value() {
        let naabu = tool(
            "naabu",
            "ports_scanner",
            "echo {{value}}:22; test {{value}} = b.example.com && echo {{value}}:443; true",
            "ports_scanner",
        );
        let executor = CommandExecutor::new(vec![naabu.clone()], Duration::from_secs(5)).unwrap();

        let payload = executor
            .execute(&job_for(&naabu, &["a.example.com", "b.example.com"]))
            .await;

        assert!(!payload.is_failure());
        assert!(payload.output.is_none());
        assert_eq!(
            payload.results,
            Some(vec![
                NormalizedResult::Ports {
                    host: Some("a.example.com".to_string()),
                    ports: vec![22]
                },
                NormalizedResult::Ports {
                    host: Some("b.example.com".to_string()),
                    ports: vec![22, 443]
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_single_host_port_scan_uses_job_context() {
        let naabu = tool("naabu", "ports_scanner", "echo {{value}}:443", "ports_scanner");
        let executor = CommandExecutor::new(vec![naabu.clone()], Duration::from_secs(5)).unwrap();

        let payload = executor.execute(&job_for(&naabu, &["a.example.com"])).await;
        assert_eq!(
            payload.results,
            Some(vec![NormalizedResult::Ports {
                host: None,
                ports: vec![443]
            }])
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let broken = tool("subfinder", "subdomains", "echo boom >&2; exit 3", "subdomains");
        let executor = CommandExecutor::new(vec![broken.clone()], Duration::from_secs(5)).unwrap();

        let payload = executor.execute(&job_for(&broken, &["a.example.com"])).await;
        let error = payload.error.unwrap();
        assert!(error.contains("3"));
        assert!(error.contains("boom"));
    }

    #[tokio::test]
    async fn test_command_timeout_is_failure() {
        let slow = tool("subfinder", "subdomains", "sleep 5", "subdomains");
        let executor = CommandExecutor::new(vec![slow.clone()], Duration::from_millis(100)).unwrap();

        let payload = executor.execute(&job_for(&slow, &["a.example.com"])).await;
        assert!(payload.error.unwrap().contains("超时"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failure() {
        let executor = CommandExecutor::new(Vec::new(), Duration::from_secs(5)).unwrap();
        let ghost = tool("masscan", "ports_scanner", "true", "ports_scanner");

        let payload = executor.execute(&job_for(&ghost, &["1.2.3.4"])).await;
        assert!(payload.is_failure());
    }

    #[test]
    fn test_unknown_parser_is_rejected() {
        let odd = tool("odd", "odd", "true", "no-such-parser");
        assert!(CommandExecutor::new(vec![odd], Duration::from_secs(1)).is_err());
    }
}
