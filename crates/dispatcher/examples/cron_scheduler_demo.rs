use chrono::{NaiveTime, Utc};
use scheduler_dispatcher::cron_utils::{parse_days_of_week, resolve_cron_expression, resolve_time_zone};
use scheduler_dispatcher::CronScheduler;
use scheduler_domain::{ScheduleStrategy, ScheduleType, StrategySpec};

fn strategy(name: &str, schedule_type: ScheduleType) -> StrategySpec {
    StrategySpec {
        name: name.to_string(),
        description: None,
        schedule_type,
        cron_expression: None,
        start_time: None,
        end_time: None,
        time_zone: None,
        interval_seconds: None,
        days_of_week: vec![],
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== 调度策略表达式推导演示 ===\n");

    let mut every_90s = strategy("每90秒", ScheduleType::FixedRate);
    every_90s.interval_seconds = Some(90);

    let mut every_15s = strategy("每15秒", ScheduleType::FixedRate);
    every_15s.interval_seconds = Some(15);

    let mut morning = strategy("每天早上", ScheduleType::Daily);
    morning.start_time = NaiveTime::from_hms_opt(8, 30, 0);
    morning.time_zone = Some("Asia/Shanghai".to_string());

    let mut weekdays = strategy("周一三五", ScheduleType::Weekly);
    weekdays.start_time = NaiveTime::from_hms_opt(18, 0, 0);
    weekdays.days_of_week = parse_days_of_week("mon, wednesday ,FRI");

    let mut raw = strategy("原始CRON", ScheduleType::Cron);
    raw.cron_expression = Some("0 0 9-17 * * MON-FRI".to_string());

    let now = Utc::now();
    for spec in [every_90s, every_15s, morning, weekdays, raw] {
        let strategy = ScheduleStrategy::from_spec(spec);
        let expression = resolve_cron_expression(&strategy)?;
        let zone = resolve_time_zone(strategy.time_zone.as_deref(), None)?;

        println!("{} ({}): {}", strategy.name, strategy.schedule_type.as_str(), expression);
        let scheduler = CronScheduler::new(&expression)?;
        for (i, time) in scheduler.upcoming_times(zone, now, 3).iter().enumerate() {
            println!("   第{}次: {}", i + 1, time.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        println!();
    }

    println!("CRON表达式验证:");
    for expr in ["0 */15 * * * *", "0 0 25 * * *", "invalid", ""] {
        match CronScheduler::validate_cron_expression(expr) {
            Ok(()) => println!("   ✓ '{expr}'"),
            Err(e) => println!("   ✗ '{expr}': {e}"),
        }
    }

    Ok(())
}
