//! Export functionality for cluster reports.
//!
//! Writes the JSON, HTML and CSV forms of a [`Report`] plus the compact
//! `clusters.json` list.

use super::Report;
use crate::core::cluster::Cluster;
use crate::error::ReportError;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where the artifacts of a report run were written
#[derive(Debug, Clone)]
pub struct ReportPaths {
    /// `<out>/<runId>/report`
    pub report_dir: PathBuf,
    pub report_json: PathBuf,
    pub index_html: PathBuf,
    pub clusters_csv: PathBuf,
    /// `<out>/<runId>/clusters.json`
    pub clusters_json: PathBuf,
}

impl ReportPaths {
    pub fn new(out_dir: &Path, run_id: &str) -> Self {
        let run_dir = out_dir.join(run_id);
        let report_dir = run_dir.join("report");
        Self {
            report_json: report_dir.join("report.json"),
            index_html: report_dir.join("index.html"),
            clusters_csv: report_dir.join("clusters.csv"),
            clusters_json: run_dir.join("clusters.json"),
            report_dir,
        }
    }
}

#[derive(Serialize)]
struct ClusterEntry<'a> {
    cluster_id: &'a str,
    representative_id: &'a str,
    members: Vec<MemberRef<'a>>,
}

#[derive(Serialize)]
struct MemberRef<'a> {
    id: &'a str,
}

/// Export clusters as `[{cluster_id, representative_id, members: [{id}]}]`
pub fn export_clusters_json<W: Write>(clusters: &[Cluster], writer: W) -> serde_json::Result<()> {
    let entries: Vec<ClusterEntry<'_>> = clusters
        .iter()
        .map(|cluster| ClusterEntry {
            cluster_id: &cluster.cluster_id,
            representative_id: &cluster.representative_id,
            members: cluster
                .members
                .iter()
                .map(|id| MemberRef { id })
                .collect(),
        })
        .collect();
    serde_json::to_writer_pretty(writer, &entries)
}

/// Export cluster members to CSV format
///
/// CSV columns: Cluster ID, Item ID, Is Representative, Score, Filename,
/// Dimensions, Create Time, Content URL
pub fn export_csv<W: Write>(report: &Report, mut writer: W) -> std::io::Result<()> {
    writeln!(
        writer,
        "Cluster ID,Item ID,Is Representative,Score,Filename,Dimensions,Create Time,Content URL"
    )?;

    for cluster in &report.clusters {
        for member in &cluster.members {
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{}",
                csv_field(&cluster.cluster_id),
                csv_field(&member.id),
                member.is_representative,
                member.score,
                csv_field(member.filename.as_deref().unwrap_or_default()),
                csv_field(member.dimensions.as_deref().unwrap_or_default()),
                member
                    .create_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                csv_field(member.content_url.as_deref().unwrap_or_default()),
            )?;
        }
    }

    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Export the report to HTML format
///
/// Generates a standalone page listing every cluster, the top pairs and
/// the failed items.
pub fn export_html<W: Write>(report: &Report, mut writer: W) -> std::io::Result<()> {
    let title = format!("Similarity report: {}", escape_html(&report.run_id));

    write!(
        writer,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>
        :root {{
            --bg-primary: #0a0a0a;
            --bg-secondary: #1a1a1a;
            --bg-tertiary: #2a2a2a;
            --text-primary: #ffffff;
            --text-secondary: #a0a0a0;
            --accent: #3b82f6;
            --success: #22c55e;
            --danger: #ef4444;
        }}

        * {{
            margin: 0;
            padding: 0;
            box-sizing: border-box;
        }}

        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: var(--bg-primary);
            color: var(--text-primary);
            line-height: 1.6;
            padding: 2rem;
        }}

        .container {{
            max-width: 1200px;
            margin: 0 auto;
        }}

        header {{
            margin-bottom: 2rem;
            padding-bottom: 1rem;
            border-bottom: 1px solid var(--bg-tertiary);
        }}

        h2 {{
            margin: 2rem 0 1rem;
        }}

        .summary {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 1rem;
            margin-bottom: 2rem;
        }}

        .stat-card {{
            background: var(--bg-secondary);
            padding: 1.25rem;
            border-radius: 12px;
            text-align: center;
        }}

        .stat-value {{
            font-size: 1.75rem;
            font-weight: bold;
            color: var(--accent);
        }}

        .stat-label {{
            color: var(--text-secondary);
            font-size: 0.875rem;
        }}

        .cluster {{
            background: var(--bg-secondary);
            border-radius: 16px;
            margin-bottom: 1.5rem;
            overflow: hidden;
        }}

        .cluster-header {{
            padding: 1rem 1.5rem;
            background: var(--bg-tertiary);
            display: flex;
            justify-content: space-between;
        }}

        .members {{
            display: grid;
            grid-template-columns: repeat(auto-fill, minmax(220px, 1fr));
            gap: 1rem;
            padding: 1.5rem;
        }}

        .member {{
            background: var(--bg-tertiary);
            border-radius: 8px;
            padding: 1rem;
            font-size: 0.75rem;
            color: var(--text-secondary);
            word-break: break-all;
        }}

        .member.representative {{
            border: 2px solid var(--success);
        }}

        .member-id {{
            color: var(--text-primary);
            font-weight: 600;
        }}

        .keep-badge {{
            display: inline-block;
            background: var(--success);
            color: white;
            padding: 0.125rem 0.5rem;
            border-radius: 4px;
            font-size: 0.625rem;
            text-transform: uppercase;
            margin-top: 0.5rem;
        }}

        table {{
            width: 100%;
            border-collapse: collapse;
            background: var(--bg-secondary);
        }}

        th, td {{
            text-align: left;
            padding: 0.5rem 0.75rem;
            border-bottom: 1px solid var(--bg-tertiary);
            font-size: 0.875rem;
        }}

        .failure {{ color: var(--danger); }}
    </style>
</head>
<body>
    <div class="container">
        <header>
            <h1>{}</h1>
            <p style="color: var(--text-secondary);">threshold {}% &middot; topPairs {} &middot; {} hash bits</p>
        </header>
"#,
        title,
        title,
        report.parameters.threshold,
        report.parameters.top_pairs,
        report.parameters.hash_bits
    )?;

    let counters = &report.counters;
    write!(
        writer,
        r#"
        <div class="summary">
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Items</div>
            </div>
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Clusters</div>
            </div>
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Clustered Items</div>
            </div>
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Pairs</div>
            </div>
            <div class="stat-card">
                <div class="stat-value">{}</div>
                <div class="stat-label">Failures</div>
            </div>
        </div>
"#,
        counters.items, counters.clusters, counters.clustered_items, counters.pairs, counters.failures
    )?;

    writeln!(writer, "        <h2>Clusters</h2>")?;
    if report.clusters.is_empty() {
        writeln!(writer, "        <p>No clusters at this threshold.</p>")?;
    }

    for cluster in &report.clusters {
        let mean = cluster
            .similarity
            .mean
            .map(|m| format!("mean {}%", m))
            .unwrap_or_else(|| "no scored pairs".to_string());

        write!(
            writer,
            r#"
        <div class="cluster">
            <div class="cluster-header">
                <span>{} &middot; {} items</span>
                <span>{}</span>
            </div>
            <div class="members">
"#,
            escape_html(&cluster.cluster_id),
            cluster.size,
            mean
        )?;

        for member in &cluster.members {
            let class = if member.is_representative {
                "member representative"
            } else {
                "member"
            };
            let title = member.filename.as_deref().unwrap_or("Unknown");
            let dimensions = member.dimensions.as_deref().unwrap_or("?");
            let created = member
                .create_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            let link = member
                .content_url
                .as_deref()
                .map(|url| format!("<a href=\"{}\">content</a>", escape_html(url)))
                .unwrap_or_default();

            write!(
                writer,
                r#"
                <div class="{}">
                    <div class="member-id">{}</div>
                    <div>{}</div>
                    <div>{} &middot; score {}</div>
                    <div>{}</div>
                    <div>{}</div>
                    {}
                </div>
"#,
                class,
                escape_html(&member.id),
                escape_html(title),
                escape_html(dimensions),
                member.score,
                escape_html(&created),
                link,
                if member.is_representative {
                    "<span class=\"keep-badge\">Representative</span>"
                } else {
                    ""
                }
            )?;
        }

        writeln!(writer, "            </div>\n        </div>")?;
    }

    writeln!(writer, "        <h2>Top pairs</h2>")?;
    writeln!(
        writer,
        "        <table>\n            <tr><th>Item A</th><th>Item B</th><th>Similarity</th><th>Distance</th></tr>"
    )?;
    for pair in &report.top_pairs {
        writeln!(
            writer,
            "            <tr><td>{}</td><td>{}</td><td>{}%</td><td>{}/{}</td></tr>",
            escape_html(&pair.id_a),
            escape_html(&pair.id_b),
            pair.similarity_percent,
            pair.hamming_distance,
            pair.hash_bits
        )?;
    }
    writeln!(writer, "        </table>")?;

    writeln!(writer, "        <h2>Failures</h2>")?;
    if report.failures.is_empty() {
        writeln!(writer, "        <p>None.</p>")?;
    } else {
        writeln!(
            writer,
            "        <table>\n            <tr><th>Item</th><th>Reason</th><th>Detail</th></tr>"
        )?;
        for failure in &report.failures {
            writeln!(
                writer,
                "            <tr class=\"failure\"><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&failure.item_id),
                failure.reason,
                escape_html(&failure.detail)
            )?;
        }
        writeln!(writer, "        </table>")?;
    }

    write!(
        writer,
        r#"
    </div>
</body>
</html>
"#
    )?;

    Ok(())
}

fn write_file<F>(path: &Path, write: F) -> Result<(), ReportError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let io_err = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer).map_err(io_err)?;
    writer.flush().map_err(io_err)
}

/// Write every artifact of a report under `<out>/<runId>/`
pub fn write_report(
    out_dir: &Path,
    report: &Report,
    clusters: &[Cluster],
) -> Result<ReportPaths, ReportError> {
    let paths = ReportPaths::new(out_dir, &report.run_id);
    fs::create_dir_all(&paths.report_dir).map_err(|source| ReportError::Write {
        path: paths.report_dir.clone(),
        source,
    })?;

    let json = serde_json::to_string_pretty(report).map_err(|source| ReportError::Serialize {
        what: "report",
        source,
    })?;
    write_file(&paths.report_json, |w| w.write_all(json.as_bytes()))?;
    write_file(&paths.index_html, |w| export_html(report, w))?;
    write_file(&paths.clusters_csv, |w| export_csv(report, w))?;

    let mut clusters_json = Vec::new();
    export_clusters_json(clusters, &mut clusters_json).map_err(|source| {
        ReportError::Serialize {
            what: "clusters",
            source,
        }
    })?;
    write_file(&paths.clusters_json, |w| w.write_all(&clusters_json))?;

    tracing::info!(
        dir = %paths.report_dir.display(),
        clusters = report.clusters.len(),
        "report written"
    );

    Ok(paths)
}
