//! Compilation driver.
//!
//! Fans out one task per output artifact on a rayon scope: the shared registry
//! file, one record-definition file per workbook, and one data-table file per
//! sheet. Schema resolution and row indexes are cached per workbook, so tasks
//! touching the same sheets share the work. Failures are collected and the
//! first one is reported after every task has finished.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::config::SeparatorConfig;
use crate::emit::records::emit_records;
use crate::emit::registry::{RegistryEntry, emit_registry};
use crate::emit::tables::TableEmitter;
use crate::emit::GENERATED_BANNER;
use crate::errors::{CompileError, Result};
use crate::parse::CellParser;
use crate::provider::{SheetSource, XlsxWorkbook};
use crate::schema::SchemaResolver;

/// One input workbook and the sheets to compile out of it.
#[derive(Debug, Clone)]
pub struct WorkbookGroup {
    pub path: PathBuf,
    /// stem of the generated module name, `file_<stem>.rs`.
    pub stem: String,
    /// root sheets; every sheet here gets a lookup table and a data table.
    pub sheets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub groups: Vec<WorkbookGroup>,
    pub records_dir: PathBuf,
    pub tables_dir: PathBuf,
    pub cfg: SeparatorConfig,
}

pub fn run(opts: &CompileOptions) -> Result<()> {
    // open every workbook up front so a bad path fails before anything is
    // written
    let books = opts
        .groups
        .iter()
        .map(|g| XlsxWorkbook::open(&g.path))
        .collect::<Result<Vec<_>>>()?;
    let sources: Vec<&dyn SheetSource> = books.iter().map(|b| b as &dyn SheetSource).collect();
    run_with_sources(opts, &sources)
}

pub(crate) fn run_with_sources(opts: &CompileOptions, sources: &[&dyn SheetSource]) -> Result<()> {
    info!(
        workbooks = opts.groups.len(),
        sheets = opts.groups.iter().map(|g| g.sheets.len()).sum::<usize>(),
        "compiling"
    );

    let resolvers: Vec<SchemaResolver<'_>> =
        sources.iter().map(|s| SchemaResolver::new(*s)).collect();
    let parsers: Vec<CellParser<'_>> =
        sources.iter().map(|s| CellParser::new(*s, &opts.cfg)).collect();

    let failures = Mutex::new(Vec::new());
    let failures = &failures;
    let cfg = &opts.cfg;
    let records_dir = &opts.records_dir;
    let tables_dir = &opts.tables_dir;
    let groups = &opts.groups;

    rayon::scope(|scope| {
        scope.spawn(move |_| {
            let entries: Vec<RegistryEntry> = groups
                .iter()
                .flat_map(|g| {
                    g.sheets.iter().map(|s| RegistryEntry {
                        sheet: s.clone(),
                        module: format!("file_{}", g.stem),
                    })
                })
                .collect();
            record_failure(
                failures,
                write_artifact(&records_dir.join("global_map.rs"), &emit_registry(&entries)),
            );
            record_failure(
                failures,
                write_artifact(&records_dir.join("mod.rs"), &module_index(groups)),
            );
        });

        for (i, group) in groups.iter().enumerate() {
            let resolver = &resolvers[i];
            let parser = &parsers[i];
            let source = sources[i];

            scope.spawn(move |_| {
                let label = group
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| group.path.display().to_string());
                let result = emit_records(resolver, &group.sheets, &label).and_then(|src| {
                    write_artifact(&records_dir.join(format!("file_{}.rs", group.stem)), &src)
                });
                record_failure(failures, result);
            });

            for sheet in &group.sheets {
                scope.spawn(move |_| {
                    let result = resolver
                        .resolve(sheet)
                        .and_then(|schema| TableEmitter::new(parser, cfg).emit(source, &schema))
                        .and_then(|src| {
                            write_artifact(&tables_dir.join(format!("sample_{sheet}.lua")), &src)
                        });
                    record_failure(failures, result);
                });
            }
        }
    });

    let mut failures = failures.lock().unwrap();
    if let Some(err) = failures.drain(..).next() {
        return Err(err);
    }
    format_generated(records_dir, groups)
}

fn record_failure(failures: &Mutex<Vec<CompileError>>, result: Result<()>) {
    if let Err(err) = result {
        tracing::error!("{err}");
        failures.lock().unwrap().push(err);
    }
}

/// Write one finished artifact. The content is fully rendered before the file
/// is touched; if the write itself fails, the partial file is removed.
fn write_artifact(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if let Err(err) = fs::write(path, content) {
        let _ = fs::remove_file(path);
        return Err(err.into());
    }
    debug!(path = %path.display(), "wrote");
    Ok(())
}

/// `mod.rs` re-exporting the registry and every per-workbook module.
fn module_index(groups: &[WorkbookGroup]) -> String {
    let mut out = String::new();
    for line in GENERATED_BANNER.lines() {
        writeln!(out, "// {line}").unwrap();
    }
    out.push('\n');
    out.push_str("pub mod global_map;\n");
    for g in groups {
        writeln!(out, "pub mod file_{};", g.stem).unwrap();
    }
    out
}

/// Run rustfmt over the generated Rust files. A missing rustfmt binary is
/// tolerated; a formatting failure is not, since it means the emitters
/// produced unparsable code.
fn format_generated(records_dir: &Path, groups: &[WorkbookGroup]) -> Result<()> {
    let mut files = vec![records_dir.join("global_map.rs"), records_dir.join("mod.rs")];
    files.extend(groups.iter().map(|g| records_dir.join(format!("file_{}.rs", g.stem))));

    let output = match Command::new("rustfmt").arg("--edition").arg("2021").args(&files).output() {
        Ok(output) => output,
        Err(err) => {
            warn!("rustfmt unavailable, leaving generated files unformatted: {err}");
            return Ok(());
        }
    };
    if !output.status.success() {
        return Err(CompileError::Format(String::from_utf8_lossy(&output.stderr).into_owned()));
    }
    Ok(())
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
