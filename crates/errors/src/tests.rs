#[cfg(test)]
mod error_tests {
    use crate::*;

    #[test]
    fn test_scheduler_error_display() {
        let db_op_error = SchedulerError::DatabaseOperation("Connection failed".to_string());
        assert_eq!(db_op_error.to_string(), "数据库操作错误: Connection failed");

        let strategy_error = SchedulerError::StrategyNotFound { id: 7 };
        assert_eq!(strategy_error.to_string(), "调度策略未找到: 7");

        let job_error = SchedulerError::JobNotFound { id: 123 };
        assert_eq!(job_error.to_string(), "作业未找到: 123");

        let config_error = SchedulerError::Configuration("CRON表达式为空".to_string());
        assert_eq!(config_error.to_string(), "配置错误: CRON表达式为空");

        let state_error = SchedulerError::State("策略仍被引用".to_string());
        assert_eq!(state_error.to_string(), "状态错误: 策略仍被引用");

        let engine_error = SchedulerError::TriggerEngine("offline".to_string());
        assert_eq!(engine_error.to_string(), "触发引擎错误: offline");

        let exec_error = SchedulerError::JobExecution("boom".to_string());
        assert_eq!(exec_error.to_string(), "作业执行错误: boom");

        let cron_error = SchedulerError::InvalidCron {
            expr: "bad".to_string(),
            message: "parse".to_string(),
        };
        assert_eq!(cron_error.to_string(), "无效的CRON表达式: bad - parse");
    }

    #[test]
    fn test_error_taxonomy_predicates() {
        assert!(SchedulerError::config_error("x").is_configuration_error());
        assert!(SchedulerError::InvalidCron {
            expr: "x".to_string(),
            message: "y".to_string()
        }
        .is_configuration_error());

        assert!(SchedulerError::strategy_not_found(1).is_reference_error());
        assert!(SchedulerError::job_not_found(1).is_reference_error());
        assert!(!SchedulerError::state_error("x").is_reference_error());

        assert!(SchedulerError::state_error("x").is_state_error());
        // 原始引擎错误需要由调用方包装为状态错误
        assert!(!SchedulerError::engine_error("x").is_state_error());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            SchedulerError::job_not_found(1).user_message(),
            "请求的作业不存在"
        );
        assert_eq!(
            SchedulerError::state_error("x").user_message(),
            "当前状态不允许该操作"
        );
        assert_eq!(
            SchedulerError::Internal("x".to_string()).user_message(),
            "系统繁忙，请稍后重试"
        );
    }

    #[test]
    fn test_from_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SchedulerError = json_err.into();
        assert!(matches!(err, SchedulerError::Serialization(_)));

        let err: SchedulerError = anyhow::anyhow!("wrapped").into();
        assert!(matches!(err, SchedulerError::Internal(ref m) if m == "wrapped"));
    }
}
