// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 单图交通目标检测
//
// cargo run --release --bin traffic_detect -- --source https://ultralytics.com/images/bus.jpg

use clap::Parser;

use traffic_detect::{detect_traffic_objects, Args};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if args.json && !args.save {
        log::warn!("--json has no effect without --save");
    }

    // 失败已在流程中输出, 不影响退出码
    if let Some(report) = detect_traffic_objects(&args) {
        log::info!(
            "{}: {} traffic objects",
            report.source,
            report.objects.len()
        );
    }
}
