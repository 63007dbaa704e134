//! 只追踪: 读取受试者已有的 TOM / 纤维束分割 / 端点分割结果, 逐束追踪并写出结果.
//!
//! 环境变量:
//!
//! - `TRACT_SUBJECT_DIR`: 受试者目录, 缺省为 `$HOME/dataset/tractseg/subject`;
//! - `TRACT_WORKERS`: 追踪线程数, 缺省或非正数表示全部核心;
//! - `TRACT_SCALAR`: 可选的标量图 (例如 FA), 提供时额外写出 tractometry 表.

mod result;
mod runner;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_level(log::Level::Info)?;
    let result = runner::run()?;
    result.analyze();
    Ok(())
}
