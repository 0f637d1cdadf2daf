/// 工具模块
/// Utility modules
pub mod download;

pub use download::download;

/// 生成时间字符串 (本地时区), 用于保存结果的文件名
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
