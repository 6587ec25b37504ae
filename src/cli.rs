//! Minimal CLI: workbooks → (record definitions | data tables)
use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};
use clap::Parser;

use crate::config::SeparatorConfig;
use crate::grammar;
use crate::pipeline::{self, CompileOptions, WorkbookGroup};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile xlsx sheets into Rust record definitions and Lua data tables
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    /// workbook paths or quoted glob patterns; each contributes one sheet
    /// named after its file stem
    #[arg(value_name = "WORKBOOK")]
    workbooks: Vec<String>,

    /// explicit workbook groups, e.g. `units.xlsx=[Hero,Monster],items.xlsx=[Item]`
    #[arg(short = 'f', long = "excels")]
    excels: Option<String>,

    /// output directory for the generated record definitions
    #[arg(short = 'g', long = "records-dir", default_value = "./gen_records/sample")]
    records_dir: PathBuf,

    /// output directory for the generated data tables
    #[arg(short = 'l', long = "tables-dir", default_value = "./lua/sample")]
    tables_dir: PathBuf,

    /// key/value separator inside map cells
    #[arg(short = 'm', long = "map-sep", default_value = "=")]
    map_sep: String,

    /// element separator inside array cells and between map pairs
    #[arg(short = 'a', long = "array-sep", default_value = ",")]
    array_sep: String,

    /// opening token of a nested array group
    #[arg(short = 'b', long = "token-begin", default_value = "[")]
    token_begin: String,

    /// closing token of a nested array group
    #[arg(short = 'e', long = "token-end", default_value = "]")]
    token_end: String,

    /// indentation unit in the emitted data tables
    #[arg(short = 'i', long = "indent", default_value = "\t")]
    indent: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        // 1) assemble workbook groups from both input forms
        let groups = self.collect_groups()?;
        if groups.is_empty() {
            bail!("no input workbooks given (pass paths, or --excels)");
        }

        // 2) reject colliding sheet names before any work starts; every sheet
        //    becomes one output file and one registry entry
        let mut seen = HashSet::new();
        for group in &groups {
            for sheet in &group.sheets {
                if !seen.insert(sheet.clone()) {
                    bail!("sheet {sheet:?} is listed more than once across the input workbooks");
                }
            }
        }

        // 3) compile
        let opts = CompileOptions {
            groups,
            records_dir: self.records_dir.clone(),
            tables_dir: self.tables_dir.clone(),
            cfg: SeparatorConfig {
                map_sep: self.map_sep.clone(),
                array_sep: self.array_sep.clone(),
                token_begin: self.token_begin.clone(),
                token_end: self.token_end.clone(),
                indent: self.indent.clone(),
            },
        };
        pipeline::run(&opts).context("compilation failed")?;
        Ok(())
    }

    fn collect_groups(&self) -> anyhow::Result<Vec<WorkbookGroup>> {
        let mut groups = Vec::new();

        // bare paths: a single sheet per workbook, named after the file stem
        for path in resolve_file_path_patterns(&self.workbooks)? {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
                .ok_or_else(|| anyhow!("workbook path has no usable file name: {}", path.display()))?;
            if !grammar::is_sheet_name(&stem) {
                bail!("workbook stem {stem:?} is not a valid sheet name");
            }
            groups.push(WorkbookGroup {
                stem: module_stem(&stem),
                sheets: vec![stem],
                path,
            });
        }

        // --excels groups: several sheets per workbook
        if let Some(spec) = &self.excels {
            for (path, sheets) in parse_groups(spec)? {
                for sheet in &sheets {
                    if !grammar::is_sheet_name(sheet) {
                        bail!("invalid sheet name {sheet:?} in --excels");
                    }
                }
                let path = PathBuf::from(path);
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(module_stem)
                    .ok_or_else(|| anyhow!("workbook path has no usable file name in --excels"))?;
                groups.push(WorkbookGroup { path, stem, sheets });
            }
        }

        Ok(groups)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

/// Parse the `--excels` value: `path=[Sheet,Sheet],path=[Sheet]`.
fn parse_groups(raw: &str) -> anyhow::Result<Vec<(String, Vec<String>)>> {
    let mut out = Vec::new();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else {
            bail!("--excels entry is missing `=[...]`: {rest:?}");
        };
        let path = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let Some(body) = after.strip_prefix('[') else {
            bail!("--excels sheet list must start with `[`: {after:?}");
        };
        let Some(close) = body.find(']') else {
            bail!("--excels sheet list is missing its closing `]`");
        };
        let sheets: Vec<String> = body[..close]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if path.is_empty() {
            bail!("--excels entry has an empty workbook path");
        }
        if sheets.is_empty() {
            bail!("--excels entry for {path:?} lists no sheets");
        }
        out.push((path.to_string(), sheets));
        rest = body[close + 1..].trim_start().trim_start_matches(',').trim_start();
    }
    Ok(out)
}

/// A sheet or file stem reduced to a usable module-name stem.
fn module_stem(stem: &str) -> String {
    let mut out: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            // Treat as a glob pattern
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            // Treat as a literal path
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excels_groups_parse() {
        let groups = parse_groups("units.xlsx=[Hero,Monster], items.xlsx=[Item]").unwrap();
        assert_eq!(
            groups,
            vec![
                ("units.xlsx".to_string(), vec!["Hero".to_string(), "Monster".to_string()]),
                ("items.xlsx".to_string(), vec!["Item".to_string()]),
            ]
        );
    }

    #[test]
    fn malformed_excels_groups_are_rejected() {
        assert!(parse_groups("units.xlsx").is_err());
        assert!(parse_groups("units.xlsx=Hero").is_err());
        assert!(parse_groups("units.xlsx=[Hero").is_err());
        assert!(parse_groups("units.xlsx=[]").is_err());
        assert!(parse_groups("=[Hero]").is_err());
    }

    #[test]
    fn module_stems_are_lowercase_identifiers() {
        assert_eq!(module_stem("Units"), "units");
        assert_eq!(module_stem("battle-data"), "battle_data");
        assert_eq!(module_stem("2v2"), "_2v2");
    }

    #[test]
    fn duplicate_sheet_names_across_groups_fail() {
        let cli = CommandLineInterface::parse_from([
            "xlsx-tablegen",
            "-f",
            "a.xlsx=[Hero],b.xlsx=[Hero]",
        ]);
        let err = cli.run().unwrap_err();
        assert!(err.to_string().contains("listed more than once"));
    }
}
