use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("调度策略未找到: {id}")]
    StrategyNotFound { id: i64 },
    #[error("作业未找到: {id}")]
    JobNotFound { id: i64 },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("状态错误: {0}")]
    State(String),
    #[error("触发引擎错误: {0}")]
    TriggerEngine(String),
    #[error("作业执行错误: {0}")]
    JobExecution(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn strategy_not_found(id: i64) -> Self {
        Self::StrategyNotFound { id }
    }
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn state_error<S: Into<String>>(msg: S) -> Self {
        Self::State(msg.into())
    }
    pub fn engine_error<S: Into<String>>(msg: S) -> Self {
        Self::TriggerEngine(msg.into())
    }
    pub fn execution_error<S: Into<String>>(msg: S) -> Self {
        Self::JobExecution(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }

    /// 调度定义不完整或格式错误
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::InvalidCron { .. }
        )
    }
    /// 悬空引用：策略或作业不存在
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::StrategyNotFound { .. } | SchedulerError::JobNotFound { .. }
        )
    }
    /// 当前状态下的非法操作，包括触发引擎同步失败
    pub fn is_state_error(&self) -> bool {
        matches!(self, SchedulerError::State(_))
    }
    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::StrategyNotFound { .. } => "请求的调度策略不存在",
            SchedulerError::JobNotFound { .. } => "请求的作业不存在",
            SchedulerError::Configuration(_) | SchedulerError::InvalidCron { .. } => {
                "调度配置有误"
            }
            SchedulerError::State(_) => "当前状态不允许该操作",
            SchedulerError::ValidationError(_) => "输入数据验证失败",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
