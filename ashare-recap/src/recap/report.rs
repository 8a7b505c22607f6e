//! Markdown rendering for the recap report.
//!
//! Section headers `## 一、`, `## 二、` and `## 三、` are stable markers that
//! downstream readers parse. Missing numbers render as [`PLACEHOLDER`].

use ashare_common::error::{Result, ResultExt};
use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::{NeedKind, ResolutionOutcome, SourceTier};

/// Rendered in place of any absent number.
pub const PLACEHOLDER: &str = "--";

const NO_DATA: &str = "暂无数据";

/// Renders resolved outcomes into the fixed report layout.
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    ledger_limit: usize,
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self { ledger_limit: 30 }
    }
}

impl ReportAssembler {
    pub fn new(ledger_limit: usize) -> Self {
        Self { ledger_limit }
    }

    /// Render with the current local time as the title timestamp.
    pub fn render(&self, outcomes: &[ResolutionOutcome]) -> String {
        self.render_at(outcomes, Local::now().naive_local())
    }

    pub fn render_at(&self, outcomes: &[ResolutionOutcome], generated_at: NaiveDateTime) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# {} A股复盘报告\n\n",
            generated_at.format("%Y-%m-%d %H:%M:%S")
        ));

        md.push_str("## 一、三大指数\n");
        self.render_indices(&mut md, find(outcomes, NeedKind::Indices));
        md.push('\n');

        md.push_str(&format!("## 二、龙虎榜（前{}）\n", self.ledger_limit));
        self.render_ledger(&mut md, find(outcomes, NeedKind::LargeTradeLedger));
        md.push('\n');

        md.push_str("## 三、概念板块与龙头\n");
        self.render_sectors(&mut md, outcomes);

        md
    }

    fn render_indices(&self, md: &mut String, outcome: Option<&ResolutionOutcome>) {
        let Some(outcome) = outcome.filter(|o| !o.is_unavailable()) else {
            md.push_str(&format!("- {}\n", NO_DATA));
            return;
        };

        for index in outcome.records.iter().filter_map(|r| r.as_index()) {
            md.push_str(&format!(
                "- {}: 收于{}点，昨收{}点，涨跌幅{}\n",
                index.name,
                fmt_num(index.last),
                fmt_num(index.prev_close),
                fmt_pct(index.change_pct()),
            ));
        }
        push_note(md, outcome);
    }

    fn render_ledger(&self, md: &mut String, outcome: Option<&ResolutionOutcome>) {
        let Some(outcome) = outcome.filter(|o| !o.is_unavailable()) else {
            md.push_str(&format!("- {}\n", NO_DATA));
            return;
        };

        for row in outcome
            .records
            .iter()
            .filter_map(|r| r.as_ledger())
            .take(self.ledger_limit)
        {
            let date: &str = if row.date.is_empty() { PLACEHOLDER } else { &row.date };
            let reason: &str = if row.reason.is_empty() { PLACEHOLDER } else { &row.reason };
            md.push_str(&format!(
                "- {} {}({}) 收盘{} 涨跌幅{} 成交额{} 净买入{} 机构净买入{} 上榜原因: {}\n",
                date,
                row.name,
                row.code,
                fmt_num(row.close),
                fmt_pct(row.pct_change),
                fmt_amount(row.turnover_amount),
                fmt_amount(row.net_buy_amount),
                fmt_amount(row.institutional_net_buy),
                reason,
            ));
        }
        push_note(md, outcome);
    }

    fn render_sectors(&self, md: &mut String, outcomes: &[ResolutionOutcome]) {
        let Some(sectors) = find(outcomes, NeedKind::SectorList).filter(|o| !o.is_unavailable())
        else {
            md.push_str(&format!("- {}\n", NO_DATA));
            return;
        };

        for sector in sectors.records.iter().filter_map(|r| r.as_sector()) {
            md.push_str(&format!(
                "- {}({}) 涨跌幅{}\n",
                sector.name,
                sector.code,
                fmt_pct(sector.pct_change)
            ));

            let leaders = outcomes.iter().find(|o| {
                o.need.kind == NeedKind::SectorLeaders
                    && o.need.sector.as_ref().map_or(false, |s| s.code == sector.code)
            });
            let Some(leaders) = leaders else {
                continue;
            };

            if leaders.is_unavailable() {
                md.push_str(&format!("  - 龙头: {}\n", NO_DATA));
                continue;
            }
            for leader in leaders.records.iter().filter_map(|r| r.as_leader()) {
                md.push_str(&format!(
                    "  - 龙头: {}({}) 现价{} 涨跌幅{}\n",
                    leader.name,
                    leader.code,
                    fmt_num(leader.price),
                    fmt_pct(leader.pct_change),
                ));
            }
            if leaders.degraded {
                md.push_str("  - ⚠️ 龙头数据不完整或来自备用页面\n");
            }
        }
        push_note(md, sectors);
    }
}

fn find(outcomes: &[ResolutionOutcome], kind: NeedKind) -> Option<&ResolutionOutcome> {
    outcomes.iter().find(|o| o.need.kind == kind)
}

fn push_note(md: &mut String, outcome: &ResolutionOutcome) {
    if !outcome.degraded {
        return;
    }
    match outcome.source_used {
        SourceTier::Fallback => md.push_str("> ⚠️ 主数据源不可用，本节数据来自备用页面\n"),
        SourceTier::Primary => md.push_str("> ⚠️ 数据条数与预期不符，可能不完整\n"),
    }
}

fn fmt_num(value: Option<f64>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{:.2}", v))
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{:+.2}%", v))
}

/// Money amounts in 亿/万 for readability.
fn fmt_amount(value: Option<f64>) -> String {
    match value {
        None => PLACEHOLDER.to_string(),
        Some(v) if v.abs() >= 1e8 => format!("{:.2}亿", v / 1e8),
        Some(v) if v.abs() >= 1e4 => format!("{:.2}万", v / 1e4),
        Some(v) => format!("{:.2}", v),
    }
}

// ============================================================================
// Output Files
// ============================================================================

/// Write a Markdown file named `{prefix}_{YYYY-MM-DD}_{HH-MM-SS}.md` into
/// `dir`, creating the directory when needed.
pub fn save_markdown(dir: &Path, prefix: &str, text: &str, now: NaiveDateTime) -> Result<PathBuf> {
    fs::create_dir_all(dir).context(format!("Failed to create directory {}", dir.display()))?;

    let path = dir.join(format!(
        "{}_{}_{}.md",
        prefix,
        now.format("%Y-%m-%d"),
        now.format("%H-%M-%S")
    ));
    fs::write(&path, text).context(format!("Failed to write {}", path.display()))?;

    Ok(path)
}

/// Save a rendered recap report.
pub fn save_report(dir: &Path, text: &str, now: NaiveDateTime) -> Result<PathBuf> {
    save_markdown(dir, "复盘报告", text, now)
}
