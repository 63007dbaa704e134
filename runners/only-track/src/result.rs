//! 追踪结果汇总.

use std::io::{self, Write};
use std::time::Duration;
use tract_berry::tracking::Provenance;

/// 将单个纤维束的追踪记录写进 `w` 中.
fn describe_into<W: Write>(
    name: &str,
    r: &Result<Provenance, String>,
    w: &mut W,
) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Bundle `{name}`:")?;
    let p = match r {
        Ok(p) => p,
        Err(e) => return write!(w, "{S4}Failed: {e}"),
    };
    writeln!(w, "{S4}Streamlines: {}/{}", p.achieved, p.target)?;
    writeln!(w, "{S4}Attempts: {}", p.attempts)?;
    writeln!(w, "{S4}Seeds of accepted attempt: {}", p.seed_count)?;
    writeln!(
        w,
        "{S4}Dilation (bundle/endings): {}/{}",
        p.dilation, p.endpoint_dilation
    )?;
    let ratio = if p.seed_count == 0 {
        "/".to_string()
    } else {
        format!("{:.6}", p.achieved as f64 / p.seed_count as f64)
    };
    write!(w, "{S4}Acceptance ratio: {ratio}")?;
    if p.is_under_target() {
        write!(w, "\n{S4}(under target)")?;
    }
    Ok(())
}

/// 追踪最终结果.
pub struct TrackReport {
    data: Vec<(String, Result<Provenance, String>)>,
    elapsed: Duration,
    cpus: usize,
    profiled: Option<usize>,
}

impl TrackReport {
    pub fn new(elapsed: Duration, cpus: usize) -> Self {
        Self {
            data: vec![],
            elapsed,
            cpus,
            profiled: None,
        }
    }

    pub fn push(&mut self, name: String, r: Result<Provenance, String>) {
        self.data.push((name, r));
    }

    /// 记录参与 tractometry 的纤维束个数.
    pub fn set_profiled(&mut self, n: usize) {
        self.profiled = Some(n);
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for (key, r) in self.data.iter() {
            if describe_into(key, r, &mut buf).is_ok() {
                println!("{}", String::from_utf8_lossy(&buf));
            }
            buf.clear();

            utils::sep();
        }
        let failed = self.data.iter().filter(|(_, r)| r.is_err()).count();
        println!(
            "{} bundles, {failed} failed, {} ms on {} cpus",
            self.data.len(),
            self.elapsed.as_millis(),
            self.cpus
        );
        if let Some(n) = self.profiled {
            println!("Tractometry written for {n} bundles");
        }
    }
}
