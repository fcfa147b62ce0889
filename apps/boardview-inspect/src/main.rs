use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use serde::Serialize;

use boardview_io::{read_document, write_document, ImportReport};
use boardview_renderer::{BoardEngine, EngineConfig, EngineStats, FrameStats, HeadlessBackend, Target};

/// Load a board document into a headless engine and report on it.
#[derive(Parser, Debug)]
#[command(name = "boardview-inspect", version, about)]
struct Cli {
    /// Board document (JSON).
    document: PathBuf,

    /// Engine configuration (JSON). Unlisted fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hover and click the point (X, Z) on the board plane.
    #[arg(long, num_args = 2, value_names = ["X", "Z"], allow_negative_numbers = true)]
    pick: Option<Vec<f32>>,

    /// Write the board back out as a document after the run.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Frames to tick before reporting.
    #[arg(long, default_value_t = 1)]
    frames: u32,
}

#[derive(Debug, Serialize)]
struct PickReport {
    hovered: Option<Target>,
    selected: Option<Target>,
}

#[derive(Debug, Serialize)]
struct Report {
    document: PathBuf,
    import: ImportReport,
    frames: FrameStats,
    pick: Option<PickReport>,
    stats: EngineStats,
}

fn run(cli: &Cli) -> Result<Report> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let doc = read_document(&cli.document)
        .with_context(|| format!("reading {}", cli.document.display()))?;

    let mut engine = BoardEngine::new(HeadlessBackend::new(), config).context("starting engine")?;
    let import = engine.import_board(&doc).context("importing board")?;
    if !import.is_complete() {
        log::warn!("{} components did not fit and were dropped", import.dropped);
    }

    let pick = match cli.pick.as_deref() {
        Some([x, z]) => {
            let top = engine.board().offsets().top as f32;
            let pointer = engine
                .viewpoint()
                .world_to_screen(Vec3::new(*x, top, *z))
                .context("pick point is behind the camera")?;
            engine.pointer_move(pointer);
            engine.pointer_down(pointer);
            engine.pointer_up();
            Some(PickReport {
                hovered: engine.hover_info().cloned(),
                selected: engine.selected().cloned(),
            })
        }
        _ => None,
    };

    let mut frames = FrameStats::default();
    for _ in 0..cli.frames {
        frames.accumulate(&engine.tick(1.0 / 60.0));
    }

    if let Some(path) = &cli.export {
        write_document(path, &engine.export_board())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let stats = engine.stats();
    engine.dispose();
    Ok(Report {
        document: cli.document.clone(),
        import,
        frames,
        pick,
        stats,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let report = run(&cli)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DOC: &str = r#"{
        "board": { "width": 40, "height": 30, "thickness": 1.6 },
        "components": [
            { "id": "p1", "type": "smd_rect", "pos": [5, 0, 5], "size": [2, 2], "layer": "top", "rotation": 0 },
            { "id": "d1", "type": "drill", "pos": [-5, 0, -5], "diameter": 1 }
        ]
    }"#;

    fn cli(dir: &tempfile::TempDir, args: &[&str]) -> Cli {
        let doc = dir.path().join("board.json");
        fs::write(&doc, DOC).unwrap();
        let mut argv = vec!["boardview-inspect".to_string(), doc.display().to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        Cli::parse_from(argv)
    }

    #[test]
    fn test_run_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(&cli(&dir, &["--frames", "3"])).unwrap();
        assert_eq!(report.import.pads, 1);
        assert_eq!(report.import.holes, 1);
        assert_eq!(report.frames.uploads, 2);
        assert_eq!(report.stats.frames, 3);
        assert!(report.pick.is_none());
    }

    #[test]
    fn test_run_pick_selects_pad() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(&cli(&dir, &["--pick", "5", "5"])).unwrap();
        let pick = report.pick.unwrap();
        assert_eq!(pick.selected.unwrap().entity_id, "p1");
        assert_eq!(pick.hovered.unwrap().entity_id, "p1");
    }

    #[test]
    fn test_run_exports_document() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        let out_arg = out.display().to_string();
        run(&cli(&dir, &["--export", &out_arg])).unwrap();
        let exported = read_document(&out).unwrap();
        assert_eq!(exported.components.len(), 2);
    }

    #[test]
    fn test_run_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = dir.path().join("cfg.json");
        fs::write(&cfg, r#"{ "hit_tolerance": "wide" }"#).unwrap();
        let cfg_arg = cfg.display().to_string();
        assert!(run(&cli(&dir, &["--config", &cfg_arg])).is_err());
    }
}
