use anyhow::{anyhow, Context, Result};
use fixedbitset::FixedBitSet;
use log::{debug, info, warn};
use ndarray::Array2;
use serde::Serialize;
use std::{
    fs,
    io::{self, Write},
    path::Path,
    time::Instant,
};

use crate::cli::SplitWeightsArgs;
use crate::splits::asplit::ASplit;
use crate::splits::compatibility::{classify, Compatibility};
use crate::utils::compute_least_squares_fit;
use crate::weights::nnls::{compute_splits, NNLSParams, SplitWeights};

/// Reads a distance matrix and a circular ordering from disk, estimates split
/// weights, and prints the split table.
pub struct SplitWeightEstimator {
    args: SplitWeightsArgs,
}

impl SplitWeightEstimator {
    pub fn new(args: SplitWeightsArgs) -> Self {
        SplitWeightEstimator { args }
    }

    pub fn run(&self) -> Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_to(&mut out)
    }

    pub fn run_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let t0 = Instant::now();

        let (distance_matrix, labels, parse_meta) = load_distance_matrix(&self.args.input)
            .context("loading distance matrix")?;
        let n = distance_matrix.nrows();
        info!("Loaded distance matrix: {}x{}", n, n);

        let cycle = match &self.args.cycle {
            Some(source) => parse_cycle(source, &labels).context("reading cycle")?,
            None => {
                warn!("No cycle given; using the input order of the taxa");
                (0..=n).collect()
            }
        };
        debug!("Cycle (1-based): {:?}", &cycle[1..]);

        let t_nnls = Instant::now();
        let result = compute_splits(&cycle, &distance_matrix, &self.args.nnls_params, None)
            .context("estimating split weights")?;
        let nnls_sec = t_nnls.elapsed().as_secs_f64();
        info!(
            "Estimated {} splits (cutoff = {}) in {:.3}s",
            result.splits.len(),
            self.args.nnls_params.effective_cutoff(),
            nnls_sec
        );

        let fit = compute_least_squares_fit(&distance_matrix, &result.splits);
        info!("Least-squares fit: {:.4} %", fit);

        let report = build_report(
            &self.args.input,
            &parse_meta,
            &labels,
            &cycle,
            &self.args.nnls_params,
            &result,
            fit,
        );
        if self.args.json {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        } else {
            write_table(out, &report)?;
        }

        info!("Done in {:.3}s total.", t0.elapsed().as_secs_f64());
        Ok(())
    }
}

/* ───────────── report ───────────── */

#[derive(Serialize, Clone, Debug)]
pub(crate) struct ParseMeta {
    delimiter: char,
    has_header: bool,
    has_index: bool,
    symmetry_pairs_fixed: usize,
}

#[derive(Serialize)]
struct SplitRow {
    a: Vec<String>,
    weight: f64,
    trivial: bool,
}

#[derive(Serialize)]
struct Report {
    input: String,
    ntax: usize,
    matrix: ParseMeta,
    cycle: Vec<String>,
    method: &'static str,
    tolerance: f64,
    cutoff: f64,
    converged: bool,
    iterations: usize,
    objective: f64,
    fit_percent: f64,
    compatibility: Compatibility,
    total_weight: f64,
    splits: Vec<SplitRow>,
}

fn build_report(
    input: &str,
    parse_meta: &ParseMeta,
    labels: &[String],
    cycle: &[usize],
    params: &NNLSParams,
    result: &SplitWeights,
    fit: f64,
) -> Report {
    let splits: Vec<SplitRow> = result
        .splits
        .iter()
        .map(|s| SplitRow {
            a: side_labels(s, labels),
            weight: s.get_weight(),
            trivial: s.is_trivial(),
        })
        .collect();
    Report {
        input: input.to_string(),
        ntax: labels.len(),
        matrix: parse_meta.clone(),
        cycle: cycle[1..].iter().map(|&t| labels[t - 1].clone()).collect(),
        method: params.method.as_str(),
        tolerance: params.tolerance,
        cutoff: params.effective_cutoff(),
        converged: result.converged,
        iterations: result.iterations,
        objective: result.objective,
        fit_percent: fit,
        compatibility: classify(&result.splits),
        total_weight: result.splits.iter().map(|s| s.get_weight()).sum(),
        splits,
    }
}

fn side_labels(split: &ASplit, labels: &[String]) -> Vec<String> {
    split.a_taxa().into_iter().map(|t| labels[t - 1].clone()).collect()
}

fn write_table<W: Write>(out: &mut W, report: &Report) -> Result<()> {
    writeln!(out, "# taxa\t{}", report.ntax)?;
    writeln!(out, "# cycle\t{}", report.cycle.join(","))?;
    writeln!(
        out,
        "# method\t{}\tconverged\t{}\titerations\t{}",
        report.method, report.converged, report.iterations
    )?;
    writeln!(out, "# objective\t{}", report.objective)?;
    writeln!(out, "# fit\t{:.4}", report.fit_percent)?;
    writeln!(out, "# splits\t{}\t{:?}", report.splits.len(), report.compatibility)?;
    writeln!(out, "id\tweight\tsize\tA")?;
    for (k, row) in report.splits.iter().enumerate() {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            k + 1,
            row.weight,
            row.a.len(),
            row.a.join(",")
        )?;
    }
    Ok(())
}

/* ───────────── I/O ───────────── */

/// Parse CSV/TSV/; / | / space; header/index row optional.
/// Returns (n×n distances, labels, parse meta incl. symmetry fixes).
pub(crate) fn load_distance_matrix(path: &str) -> Result<(Array2<f64>, Vec<String>, ParseMeta)> {
    let text = fs::read_to_string(path).with_context(|| format!("reading '{}'", path))?;

    let first_line = text
        .lines()
        .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .ok_or_else(|| anyhow!("no data lines found"))?
        .to_string();
    let delim = detect_delim(&first_line);
    debug!("Detected delimiter: {:?}", delim);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .delimiter(delim as u8)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        let row: Vec<String> = rec
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| delim != ' ' || !s.is_empty())
            .collect();
        if !row.is_empty() && row.iter().any(|t| !t.is_empty()) {
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Err(anyhow!("empty table"));
    }

    let (has_header, has_index) = sniff_header_index(&rows);
    debug!("Header: {}, Index column: {}", has_header, has_index);

    let (labels, start_row, start_col) = match (has_header, has_index) {
        (true, true) => (rows[0][1..].to_vec(), 1usize, 1usize),
        (true, false) => (rows[0].clone(), 1, 0),
        (false, true) => (rows.iter().map(|r| r[0].clone()).collect(), 0, 1),
        (false, false) => ((1..=rows.len()).map(|i| format!("t{}", i)).collect(), 0, 0),
    };

    let n = rows.len() - start_row;
    for (ri, row) in rows[start_row..].iter().enumerate() {
        let m = row.len().saturating_sub(start_col);
        if m != n {
            return Err(anyhow!(
                "parsed table is not square: {} rows but row {} has {} values",
                n,
                ri + start_row + 1,
                m
            ));
        }
    }

    let mut mat = Array2::<f64>::zeros((n, n));
    for (ri, row) in rows[start_row..].iter().enumerate() {
        for (ci, tok) in row[start_col..].iter().enumerate() {
            let val: f64 = tok.parse().with_context(|| {
                format!(
                    "parsing number at row {}, col {}",
                    ri + start_row + 1,
                    ci + start_col + 1
                )
            })?;
            if !val.is_finite() || val < 0.0 {
                return Err(anyhow!(
                    "distance at row {}, col {} must be finite and non-negative (got {})",
                    ri + start_row + 1,
                    ci + start_col + 1,
                    val
                ));
            }
            mat[[ri, ci]] = val;
        }
    }

    let mut symmetry_pairs_fixed = 0usize;
    for i in 0..n {
        mat[[i, i]] = 0.0;
        for j in (i + 1)..n {
            let a = mat[[i, j]];
            let b = mat[[j, i]];
            if (a - b).abs() > 1e-12 {
                let avg = 0.5 * (a + b);
                mat[[i, j]] = avg;
                mat[[j, i]] = avg;
                symmetry_pairs_fixed += 1;
            }
        }
    }
    if symmetry_pairs_fixed > 0 {
        warn!(
            "Distance matrix not perfectly symmetric; averaged {} off-diagonal pairs",
            symmetry_pairs_fixed
        );
    }

    let labels = if labels.len() == n {
        labels
    } else {
        warn!(
            "Label count ({}) != n ({}). Synthesizing t1..tn labels.",
            labels.len(),
            n
        );
        (1..=n).map(|i| format!("t{}", i)).collect()
    };

    let meta = ParseMeta {
        delimiter: delim,
        has_header,
        has_index,
        symmetry_pairs_fixed,
    };

    Ok((mat, labels, meta))
}

/// A cycle is a file path or an inline list, separated by commas, tabs or
/// whitespace. Entries are taxon labels or 1-based taxon numbers. The result
/// carries the leading `0` sentinel.
pub(crate) fn parse_cycle(source: &str, labels: &[String]) -> Result<Vec<usize>> {
    let text = if Path::new(source).is_file() {
        fs::read_to_string(source).with_context(|| format!("reading '{}'", source))?
    } else {
        source.to_string()
    };
    let tokens: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .flat_map(|l| l.split(|c: char| c == ',' || c == ';' || c.is_whitespace()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let n = labels.len();
    let mut cycle = Vec::with_capacity(n + 1);
    cycle.push(0);
    let mut seen = FixedBitSet::with_capacity(n + 1);
    for tok in tokens {
        let taxon = match labels.iter().position(|l| l == tok) {
            Some(p) => p + 1,
            None => tok
                .parse::<usize>()
                .map_err(|_| anyhow!("unknown taxon '{}' in cycle", tok))?,
        };
        if taxon == 0 && cycle.len() == 1 && seen.count_ones(..) == 0 {
            // leading sentinel
            seen.insert(0);
            continue;
        }
        if !(1..=n).contains(&taxon) {
            return Err(anyhow!("taxon {} in cycle is outside 1..={}", taxon, n));
        }
        if seen.put(taxon) {
            return Err(anyhow!("taxon '{}' appears twice in cycle", tok));
        }
        cycle.push(taxon);
    }
    if cycle.len() != n + 1 {
        return Err(anyhow!(
            "cycle lists {} taxa but the matrix has {}",
            cycle.len() - 1,
            n
        ));
    }
    Ok(cycle)
}

const DELIMITERS: [char; 5] = [',', '\t', ';', '|', ' '];

/// The candidate occurring most often in `line`; earlier candidates win ties and
/// `,` is the fallback.
fn detect_delim(line: &str) -> char {
    DELIMITERS
        .iter()
        .map(|&c| (line.matches(c).count(), c))
        .fold((0, ','), |best, cand| if cand.0 > best.0 { cand } else { best })
        .1
}

fn is_numeric(cell: &str) -> bool {
    cell.parse::<f64>().is_ok()
}

/// Guess `(has_header, has_index)`.
///
/// A label column needs non-numeric leading cells in at least two of the first ten
/// rows, one of them below the first row (an empty corner cell counts). The first
/// row is a header when, past any label column, it holds a non-numeric cell or
/// fewer numbers than the row below it.
fn sniff_header_index(rows: &[Vec<String>]) -> (bool, bool) {
    let Some(first) = rows.first() else {
        return (false, false);
    };

    let labelled: Vec<usize> = rows
        .iter()
        .take(10)
        .enumerate()
        .filter(|(_, r)| r.first().is_some_and(|c| !is_numeric(c)))
        .map(|(i, _)| i)
        .collect();
    let has_index = labelled.len() >= 2 && labelled.iter().any(|&i| i > 0);

    let skip = usize::from(has_index);
    let numbers = |r: &[String]| r.iter().skip(skip).filter(|c| is_numeric(c)).count();
    let first_numbers = numbers(first);
    let has_header = first_numbers < first.len().saturating_sub(skip)
        || rows.get(1).is_some_and(|next| first_numbers < numbers(next));

    (has_header, has_index)
}

#[cfg(test)]
mod read_matrix_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    /// helper: write content to a temp file and invoke f(&Path)
    fn with_temp(content: &str, f: impl FnOnce(&Path)) {
        let mut tf = NamedTempFile::new().expect("tmp");
        tf.write_all(content.as_bytes()).expect("write");
        f(tf.path());
    }

    fn approx(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    fn load(p: &Path) -> Result<(Array2<f64>, Vec<String>, ParseMeta)> {
        load_distance_matrix(&p.to_string_lossy())
    }

    fn args_for(p: &Path, cycle: Option<&str>, json: bool) -> SplitWeightsArgs {
        SplitWeightsArgs {
            input: p.to_string_lossy().into_owned(),
            cycle: cycle.map(str::to_string),
            json,
            nnls_params: NNLSParams::default(),
        }
    }

    const QUARTET: &str = ",A,B,C,D\nA,0,2,4,4\nB,2,0,4,4\nC,4,4,0,2\nD,4,4,2,0\n";

    #[test]
    fn csv_header_and_index() {
        let content = r#"
,A,B,C
A,0,1,2
B,1,0,3
C,2,3,0
"#;
        with_temp(content, |p| {
            let (mat, labels, meta) = load(p).unwrap();

            assert_eq!(labels, vec!["A", "B", "C"]);
            assert!(meta.has_header);
            assert!(meta.has_index);
            assert_eq!(meta.symmetry_pairs_fixed, 0);

            assert_eq!(mat.shape(), &[3, 3]);
            assert!(approx(mat[[0, 1]], 1.0, 1e-12));
            assert!(approx(mat[[1, 2]], 3.0, 1e-12));
            assert!(approx(mat[[2, 0]], 2.0, 1e-12));
        });
    }

    #[test]
    fn csv_header_no_index() {
        with_temp("A,B,C\n0,1,2\n1,0,3\n2,3,0\n", |p| {
            let (mat, labels, meta) = load(p).unwrap();
            assert_eq!(labels, vec!["A", "B", "C"]);
            assert!(meta.has_header);
            assert!(!meta.has_index);
            assert_eq!(mat.shape(), &[3, 3]);
        });
    }

    #[test]
    fn tsv_index_no_header() {
        with_temp("A\t0\t1\t2\nB\t1\t0\t3\nC\t2\t3\t0\n", |p| {
            let (mat, labels, meta) = load(p).unwrap();
            assert_eq!(labels, vec!["A", "B", "C"]);
            assert!(!meta.has_header);
            assert!(meta.has_index);
            assert!(approx(mat[[0, 2]], 2.0, 1e-12));
        });
    }

    #[test]
    fn space_delimited_no_header_no_index() {
        with_temp("0 1 2\n1 0 3\n2 3 0\n", |p| {
            let (mat, labels, meta) = load(p).unwrap();
            assert_eq!(labels, vec!["t1", "t2", "t3"]);
            assert!(!meta.has_header);
            assert!(!meta.has_index);
            assert_eq!(mat.shape(), &[3, 3]);
        });
    }

    #[test]
    fn asymmetry_is_averaged_and_counted() {
        with_temp("A,B,C\n0,1.0,2.0\n1.1,0,3.0\n2.0,3.0,0\n", |p| {
            let (mat, _, meta) = load(p).unwrap();
            assert_eq!(meta.symmetry_pairs_fixed, 1);
            assert!(approx(mat[[0, 1]], 1.05, 1e-12));
            assert!(approx(mat[[1, 0]], 1.05, 1e-12));
        });
    }

    #[test]
    fn delimiter_and_layout_sniffing() {
        assert_eq!(detect_delim("a\tb\tc"), '\t');
        assert_eq!(detect_delim("a;b,c"), ',');
        assert_eq!(detect_delim("0"), ',');

        fn rows(t: &[&[&str]]) -> Vec<Vec<String>> {
            t.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
        }
        assert_eq!(sniff_header_index(&rows(&[&["0", "1"], &["1", "0"]])), (false, false));
        assert_eq!(sniff_header_index(&rows(&[&["2"], &["0", "1"], &["1", "0"]])), (true, false));
        assert_eq!(sniff_header_index(&rows(&[&["A", "0"], &["B", "0"]])), (false, true));
        assert_eq!(sniff_header_index(&rows(&[&["X", "0", "1"], &["1", "0", "1"]])), (true, false));
        assert_eq!(sniff_header_index(&[]), (false, false));
    }

    #[test]
    fn non_square_rejected() {
        with_temp("A,B\n0,1\n1,0\n2,3\n", |p| {
            assert!(load(p).is_err());
        });
    }

    #[test]
    fn negative_distance_rejected() {
        with_temp("0,-1\n-1,0\n", |p| {
            let err = load(p).unwrap_err();
            assert!(format!("{:#}", err).contains("non-negative"));
        });
    }

    #[test]
    fn cycle_from_labels_numbers_and_sentinel() {
        let labels: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(parse_cycle("C,A,B", &labels).unwrap(), vec![0, 3, 1, 2]);
        assert_eq!(parse_cycle("2 3 1", &labels).unwrap(), vec![0, 2, 3, 1]);
        assert_eq!(parse_cycle("0,1,3,2", &labels).unwrap(), vec![0, 1, 3, 2]);
    }

    #[test]
    fn bad_cycles_rejected() {
        let labels: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert!(parse_cycle("A,B", &labels).is_err());
        assert!(parse_cycle("A,B,B", &labels).is_err());
        assert!(parse_cycle("A,B,Z", &labels).is_err());
        assert!(parse_cycle("1,2,4", &labels).is_err());
    }

    #[test]
    fn cycle_read_from_file() {
        let labels: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        with_temp("# order\nB\nC\nA\n", |p| {
            let cycle = parse_cycle(&p.to_string_lossy(), &labels).unwrap();
            assert_eq!(cycle, vec![0, 2, 3, 1]);
        });
    }

    #[test]
    fn table_output_for_quartet() {
        with_temp(QUARTET, |p| {
            let est = SplitWeightEstimator::new(args_for(p, Some("A,B,C,D"), false));
            let mut buf = Vec::new();
            est.run_to(&mut buf).unwrap();
            let text = String::from_utf8(buf).unwrap();

            assert!(text.contains("# cycle\tA,B,C,D"));
            assert!(text.contains("# fit\t100.0000"));
            assert!(text.contains("Compatible"));
            let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
            assert_eq!(rows[0], "id\tweight\tsize\tA");
            assert_eq!(rows.len(), 6);
            assert_eq!(rows[2], "2\t2\t2\tA,B");
        });
    }

    #[test]
    fn json_output_for_quartet() {
        with_temp(QUARTET, |p| {
            let est = SplitWeightEstimator::new(args_for(p, None, true));
            let mut buf = Vec::new();
            est.run_to(&mut buf).unwrap();
            let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();

            assert_eq!(v["ntax"], 4);
            assert_eq!(v["converged"], true);
            assert_eq!(v["compatibility"], "compatible");
            assert_eq!(v["splits"].as_array().unwrap().len(), 5);
            assert_eq!(v["splits"][1]["a"], serde_json::json!(["A", "B"]));
        });
    }
}
