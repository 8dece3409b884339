//! model2glb command line front end.
//!
//! `convert` runs the import, normalize and export pipeline without a window;
//! `view` opens the interactive viewer (drop files on it, press `C` or Enter
//! to convert).

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::path::PathBuf;

    use anyhow::{Context as _, Result, anyhow, bail};
    use clap::{Parser, Subcommand};
    use model2glb::{
        ExportOptions, ModelFormat, Scene, ViewerConfig,
        error::report,
        export::{download::DirectorySink, export_scene, save_export},
        flow::{self, AppEvent},
        normalize_textures,
        resources::import_path,
    };

    #[derive(Parser)]
    #[command(
        name = "model2glb",
        version,
        about = "Convert FBX, OBJ, STL and glTF models to GLB or glTF",
        after_help = "EXAMPLES:\n  \
                      model2glb convert chair.fbx\n  \
                      model2glb convert --gltf --out-dir out a.obj b.stl\n  \
                      model2glb view scene.glb"
    )]
    struct Cli {
        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Subcommand)]
    enum Commands {
        /// Import every input into one scene and write scene.glb (or scene.gltf)
        Convert {
            #[arg(required = true)]
            inputs: Vec<PathBuf>,
            /// Directory the output file is written to
            #[arg(long, default_value = ".")]
            out_dir: PathBuf,
            /// Write pretty printed glTF JSON instead of GLB
            #[arg(long)]
            gltf: bool,
            /// Comma separated list of accepted input extensions
            #[arg(long)]
            formats: Option<String>,
        },
        /// Open the viewer window, optionally preloading files
        View {
            inputs: Vec<PathBuf>,
            /// Directory converted files are written to
            #[arg(long, default_value = ".")]
            out_dir: PathBuf,
            /// Convert to glTF JSON instead of GLB
            #[arg(long)]
            gltf: bool,
        },
    }

    pub fn main() -> Result<()> {
        let cli = Cli::parse();
        flow::init_logger();

        match cli.command {
            Commands::Convert {
                inputs,
                out_dir,
                gltf,
                formats,
            } => {
                let formats = formats
                    .as_deref()
                    .map(ModelFormat::parse_list)
                    .unwrap_or_default();
                let config = ViewerConfig {
                    export: ExportOptions { binary: !gltf },
                    output_dir: out_dir,
                    ..Default::default()
                }
                .with_formats(formats);
                convert(&config, inputs)
            }
            Commands::View {
                inputs,
                out_dir,
                gltf,
            } => {
                let config = ViewerConfig {
                    export: ExportOptions { binary: !gltf },
                    output_dir: out_dir,
                    ..Default::default()
                };
                flow::run(config, move |proxy| {
                    for path in inputs {
                        proxy
                            .send_event(AppEvent::ImportPath(path))
                            .map_err(|e| anyhow!("{e}"))?;
                    }
                    Ok(())
                })
            }
        }
    }

    fn convert(config: &ViewerConfig, inputs: Vec<PathBuf>) -> Result<()> {
        let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
        let mut scene = Scene::with_default_lights(&config.lighting);

        let mut failures = 0;
        for path in &inputs {
            match runtime.block_on(import_path(path, &config.formats)) {
                Ok(node) => scene.add(node),
                Err(e) => {
                    log::error!("{}", report(&e));
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            bail!("{failures} of {} inputs could not be imported", inputs.len());
        }

        let normalized = runtime.block_on(normalize_textures(&mut scene));
        if !normalized.is_clean() {
            log::warn!("{} textures could not be normalized", normalized.failed.len());
        }

        let result = export_scene(&scene, &config.export).map_err(|e| anyhow!(report(&e)))?;
        let sink = DirectorySink::new(config.output_dir.clone());
        let file_name = save_export(&result, &sink).map_err(|e| anyhow!(report(&e)))?;
        println!("{}", config.output_dir.join(file_name).display());
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(target_arch = "wasm32")]
fn main() {}
