use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::{debug, warn};

use recon_core::{models::WorkflowSchedule, ReconError, ReconResult};

/// CRON表达式解析和触发判断
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> ReconResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| ReconError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 由资产组定时类别构造
    pub fn for_schedule(schedule: &WorkflowSchedule) -> ReconResult<Self> {
        Self::new(schedule.cron_expression())
    }

    /// 检查给定时间是否应该触发
    ///
    /// 有上次运行时间时，上次之后的第一个触发点不晚于 `now` 即触发；
    /// 从未运行时只看最近一分钟内是否有触发点。
    pub fn should_trigger(&self, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let (from, first_run) = match last_run {
            Some(last) => (last, false),
            None => (now - Duration::minutes(1), true),
        };

        match self.schedule.after(&from).next() {
            Some(next_time) => {
                let due = next_time <= now;
                if due {
                    debug!(
                        "定时已到期: 首次={}, 触发点={}, 当前时间={}",
                        first_run,
                        next_time.format("%Y-%m-%d %H:%M:%S UTC"),
                        now.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
                due
            }
            None => {
                warn!(
                    "无法计算下一次执行时间，起点: {}",
                    from.format("%Y-%m-%d %H:%M:%S UTC")
                );
                false
            }
        }
    }

    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> ReconResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}
