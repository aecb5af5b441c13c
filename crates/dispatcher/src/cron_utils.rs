use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use scheduler_domain::{ScheduleStrategy, ScheduleType};
use scheduler_errors::{SchedulerError, SchedulerResult};

const WEEKDAY_TOKENS: [(&str, &str); 7] = [
    ("MON", "MONDAY"),
    ("TUE", "TUESDAY"),
    ("WED", "WEDNESDAY"),
    ("THU", "THURSDAY"),
    ("FRI", "FRIDAY"),
    ("SAT", "SATURDAY"),
    ("SUN", "SUNDAY"),
];

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> SchedulerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 获取下一次执行时间（按 UTC 计算）
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 在指定时区内计算 `from` 之后的执行时间序列，`None` 表示系统本地时区
    pub fn upcoming_in_zone(
        &self,
        zone: Option<Tz>,
        from: DateTime<Utc>,
    ) -> Box<dyn Iterator<Item = DateTime<Utc>> + '_> {
        match zone {
            Some(tz) => Box::new(
                self.schedule
                    .after(&from.with_timezone(&tz))
                    .map(|t| t.with_timezone(&Utc)),
            ),
            None => Box::new(
                self.schedule
                    .after(&from.with_timezone(&Local))
                    .map(|t| t.with_timezone(&Utc)),
            ),
        }
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(
        &self,
        zone: Option<Tz>,
        from: DateTime<Utc>,
        count: usize,
    ) -> Vec<DateTime<Utc>> {
        self.upcoming_in_zone(zone, from).take(count).collect()
    }
}

/// 将结构化的调度字段映射为 6 段式表达式 `秒 分 时 日 月 周`
///
/// FIXED_RATE 间隔不小于 60 秒时按整分钟截断（90 秒得到每 1 分钟），余数丢弃。
pub fn resolve_cron_expression(strategy: &ScheduleStrategy) -> SchedulerResult<String> {
    let expression = match strategy.schedule_type {
        ScheduleType::Cron => {
            let expr = strategy.cron_expression.trim();
            if expr.is_empty() {
                return Err(SchedulerError::config_error(format!(
                    "CRON类型策略 '{}' 缺少cron表达式",
                    strategy.name
                )));
            }
            expr.to_string()
        }
        ScheduleType::FixedRate => {
            let seconds = strategy
                .interval_seconds
                .filter(|s| *s > 0)
                .ok_or_else(|| {
                    SchedulerError::config_error(format!(
                        "FIXED_RATE类型策略 '{}' 的间隔秒数必须大于0",
                        strategy.name
                    ))
                })?;
            fixed_rate_expression(&strategy.name, seconds)?
        }
        ScheduleType::Daily => {
            let start = strategy.start_time.ok_or_else(|| {
                SchedulerError::config_error(format!(
                    "DAILY类型策略 '{}' 缺少开始时间",
                    strategy.name
                ))
            })?;
            format!("{} {} {} * * *", start.second(), start.minute(), start.hour())
        }
        ScheduleType::Weekly => {
            let start = strategy.start_time.ok_or_else(|| {
                SchedulerError::config_error(format!(
                    "WEEKLY类型策略 '{}' 缺少开始时间",
                    strategy.name
                ))
            })?;
            let days = normalize_days_of_week(&strategy.days_of_week)?;
            if days.is_empty() {
                return Err(SchedulerError::config_error(format!(
                    "WEEKLY类型策略 '{}' 的星期列表为空",
                    strategy.name
                )));
            }
            format!(
                "{} {} {} * * {}",
                start.second(),
                start.minute(),
                start.hour(),
                days.join(",")
            )
        }
    };

    CronScheduler::validate_cron_expression(&expression)?;
    debug!(
        "策略 '{}' ({}) 解析得到表达式: {}",
        strategy.name,
        strategy.schedule_type.as_str(),
        expression
    );
    Ok(expression)
}

/// 固定间隔转 cron：秒级、分钟级（余数舍去）、整小时级，最长一天
fn fixed_rate_expression(name: &str, seconds: i64) -> SchedulerResult<String> {
    let minutes = seconds / 60;
    match minutes {
        0 => Ok(format!("*/{seconds} * * * * *")),
        1..=59 => Ok(format!("0 */{minutes} * * * *")),
        _ if minutes % 60 == 0 && minutes / 60 < 24 => {
            Ok(format!("0 0 */{} * * *", minutes / 60))
        }
        1440 => Ok("0 0 0 * * *".to_string()),
        _ => Err(SchedulerError::config_error(format!(
            "FIXED_RATE类型策略 '{name}' 的间隔 {seconds} 秒无法用cron表达式表示，\
             超过一小时的间隔必须是整小时且不超过24小时"
        ))),
    }
}

/// 拆分逗号分隔的星期列表：去除空白、丢弃空项并转为大写
pub fn parse_days_of_week(raw: &str) -> Vec<String> {
    split_tokens(std::iter::once(raw))
}

fn split_tokens<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items
        .flat_map(|item| item.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_uppercase)
        .collect()
}

/// 规范化星期令牌，全称转换为三字母缩写，未知令牌视为配置错误
pub fn normalize_days_of_week(days: &[String]) -> SchedulerResult<Vec<String>> {
    split_tokens(days.iter().map(String::as_str))
        .into_iter()
        .map(|token| {
            WEEKDAY_TOKENS
                .iter()
                .find(|(short, long)| token == *short || token == *long)
                .map(|(short, _)| short.to_string())
                .ok_or_else(|| SchedulerError::config_error(format!("无效的星期令牌: {token}")))
        })
        .collect()
}

/// 解析策略时区，未声明时回退到默认时区；都为空时由调用方使用系统本地时区
pub fn resolve_time_zone(name: Option<&str>, default: Option<Tz>) -> SchedulerResult<Option<Tz>> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name
            .parse::<Tz>()
            .map(Some)
            .map_err(|_| SchedulerError::config_error(format!("无效的时区: {name}"))),
        None => Ok(default),
    }
}

/// 某一时刻在指定时区中的日历日期
pub fn date_in_zone(zone: Option<Tz>, at: DateTime<Utc>) -> NaiveDate {
    match zone {
        Some(tz) => at.with_timezone(&tz).date_naive(),
        None => at.with_timezone(&Local).date_naive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn strategy(schedule_type: ScheduleType) -> ScheduleStrategy {
        ScheduleStrategy {
            id: 1,
            name: "test".to_string(),
            description: None,
            schedule_type,
            cron_expression: String::new(),
            start_time: None,
            end_time: None,
            time_zone: None,
            interval_seconds: None,
            days_of_week: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cron_pass_through() {
        let mut s = strategy(ScheduleType::Cron);
        s.cron_expression = "  0 15 10 * * *  ".to_string();
        assert_eq!(resolve_cron_expression(&s).unwrap(), "0 15 10 * * *");
    }

    #[test]
    fn test_cron_requires_expression() {
        let s = strategy(ScheduleType::Cron);
        let err = resolve_cron_expression(&s).unwrap_err();
        assert!(err.is_configuration_error());

        let mut s = strategy(ScheduleType::Cron);
        s.cron_expression = "not a cron".to_string();
        assert!(resolve_cron_expression(&s)
            .unwrap_err()
            .is_configuration_error());
    }

    #[test]
    fn test_fixed_rate_truncates_to_whole_minutes() {
        let mut s = strategy(ScheduleType::FixedRate);
        s.interval_seconds = Some(90);
        assert_eq!(resolve_cron_expression(&s).unwrap(), "0 */1 * * * *");

        s.interval_seconds = Some(600);
        assert_eq!(resolve_cron_expression(&s).unwrap(), "0 */10 * * * *");
    }

    #[test]
    fn test_fixed_rate_whole_hours() {
        let mut s = strategy(ScheduleType::FixedRate);
        s.interval_seconds = Some(3600);
        assert_eq!(resolve_cron_expression(&s).unwrap(), "0 0 */1 * * *");

        s.interval_seconds = Some(7200);
        assert_eq!(resolve_cron_expression(&s).unwrap(), "0 0 */2 * * *");

        // 不足一小时的余数同样舍去
        s.interval_seconds = Some(3659);
        assert_eq!(resolve_cron_expression(&s).unwrap(), "0 0 */1 * * *");

        s.interval_seconds = Some(86_400);
        assert_eq!(resolve_cron_expression(&s).unwrap(), "0 0 0 * * *");
    }

    #[test]
    fn test_fixed_rate_unrepresentable_interval() {
        let mut s = strategy(ScheduleType::FixedRate);
        for seconds in [5400, 3660, 2 * 86_400] {
            s.interval_seconds = Some(seconds);
            let err = resolve_cron_expression(&s).unwrap_err();
            assert!(
                matches!(err, SchedulerError::Configuration(_)),
                "{seconds}s: {err:?}"
            );
        }
    }

    #[test]
    fn test_fixed_rate_seconds_granularity() {
        let mut s = strategy(ScheduleType::FixedRate);
        s.interval_seconds = Some(30);
        assert_eq!(resolve_cron_expression(&s).unwrap(), "*/30 * * * * *");
    }

    #[test]
    fn test_fixed_rate_requires_positive_interval() {
        let mut s = strategy(ScheduleType::FixedRate);
        assert!(resolve_cron_expression(&s).unwrap_err().is_configuration_error());
        s.interval_seconds = Some(0);
        assert!(resolve_cron_expression(&s).unwrap_err().is_configuration_error());
        s.interval_seconds = Some(-5);
        assert!(resolve_cron_expression(&s).unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_daily_fires_once_per_day_at_start_time() {
        let mut s = strategy(ScheduleType::Daily);
        s.start_time = NaiveTime::from_hms_opt(8, 30, 0);
        let expr = resolve_cron_expression(&s).unwrap();
        assert_eq!(expr, "0 30 8 * * *");

        let scheduler = CronScheduler::new(&expr).unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let times = scheduler.upcoming_times(Some(chrono_tz::UTC), from, 3);
        assert_eq!(times.len(), 3);
        for (i, t) in times.iter().enumerate() {
            assert_eq!((t.hour(), t.minute(), t.second()), (8, 30, 0));
            if i > 0 {
                assert_eq!((*t - times[i - 1]).num_hours(), 24);
            }
        }
    }

    #[test]
    fn test_daily_requires_start_time() {
        let s = strategy(ScheduleType::Daily);
        assert!(resolve_cron_expression(&s).unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_weekly_embeds_days_and_time() {
        let mut s = strategy(ScheduleType::Weekly);
        s.start_time = NaiveTime::from_hms_opt(9, 0, 0);
        s.days_of_week = vec!["MON,WED,FRI".to_string()];
        let expr = resolve_cron_expression(&s).unwrap();
        assert_eq!(expr, "0 0 9 * * MON,WED,FRI");
    }

    #[test]
    fn test_weekly_trims_and_drops_blank_tokens() {
        let mut s = strategy(ScheduleType::Weekly);
        s.start_time = NaiveTime::from_hms_opt(18, 5, 30);
        s.days_of_week = vec![" mon, ".to_string(), "".to_string(), "friday".to_string()];
        assert_eq!(resolve_cron_expression(&s).unwrap(), "30 5 18 * * MON,FRI");
    }

    #[test]
    fn test_weekly_rejects_empty_or_unknown_days() {
        let mut s = strategy(ScheduleType::Weekly);
        s.start_time = NaiveTime::from_hms_opt(9, 0, 0);
        s.days_of_week = vec![" , ,".to_string()];
        assert!(resolve_cron_expression(&s).unwrap_err().is_configuration_error());

        s.days_of_week = vec!["MON,FUNDAY".to_string()];
        assert!(resolve_cron_expression(&s).unwrap_err().is_configuration_error());

        s.days_of_week = vec!["MON".to_string()];
        s.start_time = None;
        assert!(resolve_cron_expression(&s).unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_parse_days_of_week() {
        assert_eq!(
            parse_days_of_week("mon, WED,,fri "),
            vec!["MON".to_string(), "WED".to_string(), "FRI".to_string()]
        );
        assert!(parse_days_of_week(" , ").is_empty());
    }

    #[test]
    fn test_resolve_time_zone() {
        let shanghai: Tz = "Asia/Shanghai".parse().unwrap();
        assert_eq!(
            resolve_time_zone(Some("Asia/Shanghai"), None).unwrap(),
            Some(shanghai)
        );
        assert_eq!(
            resolve_time_zone(None, Some(chrono_tz::UTC)).unwrap(),
            Some(chrono_tz::UTC)
        );
        assert_eq!(resolve_time_zone(Some("  "), None).unwrap(), None);
        assert!(resolve_time_zone(Some("Atlantis/Capital"), None)
            .unwrap_err()
            .is_configuration_error());
    }

    #[test]
    fn test_date_in_zone_crosses_midnight() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap();
        let shanghai: Tz = "Asia/Shanghai".parse().unwrap();
        assert_eq!(
            date_in_zone(Some(shanghai), at),
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
        );
        assert_eq!(
            date_in_zone(Some(chrono_tz::UTC), at),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
    }

    #[test]
    fn test_cron_scheduler_creation() {
        assert!(CronScheduler::new("0 0 0 * * *").is_ok());
        assert!(CronScheduler::new("invalid").is_err());
        assert!(CronScheduler::validate_cron_expression("").is_err());
    }

    #[test]
    fn test_next_execution_time() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let next = scheduler.next_execution_time(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap());
    }
}
