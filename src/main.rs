use chrono::Local;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use slideshow_manager::catalog::{self, Skipped};
use slideshow_manager::config::AUTO_PLAYER;
use slideshow_manager::player;
use slideshow_manager::slideshow::{self, EncodingParams};
use slideshow_manager::{Assembler, Catalog, FfmpegEncoder, ImageEntry, SortKey, Workspace};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

struct CliError(String);

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.red())
    }
}

// `main` prints the Debug form of its error.
impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for CliError {}

fn fail(message: impl Into<String>) -> Box<dyn Error> {
    Box::new(CliError(message.into()))
}

fn view_args() -> [Arg; 2] {
    [
        Arg::new("sort")
            .short('s')
            .long("sort")
            .value_name("KEY")
            .help("Order of images: name (A-Z), modified (newest first) or size (largest first)")
            .value_parser(SortKey::NAMES)
            .default_value("name"),
        Arg::new("search")
            .short('q')
            .long("search")
            .value_name("TEXT")
            .help("Only images whose file name contains TEXT (case-insensitive)")
            .default_value(""),
    ]
}

fn names_arg(help: &'static str) -> Arg {
    Arg::new("names")
        .value_name("NAME")
        .help(help)
        .num_args(1..)
        .required(true)
}

fn cli() -> Command {
    Command::new("slideshow-manager")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Manage a folder of images and turn the visible ones into an MP4 slideshow")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .value_name("DIR")
                .help("Directory with the images (default: current directory)")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: DIR/.slideshow_config.json)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log debug output (RUST_LOG overrides)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("Append log output to FILE instead of stderr")
                .global(true),
        )
        .subcommand(
            Command::new("list")
                .about("List images with their visibility")
                .args(view_args()),
        )
        .subcommand(Command::new("hide").about("Exclude images from slideshows").arg(names_arg("Image file names")))
        .subcommand(Command::new("show").about("Include images in slideshows").arg(names_arg("Image file names")))
        .subcommand(Command::new("toggle").about("Flip visibility of images").arg(names_arg("Image file names")))
        .subcommand(
            Command::new("rename")
                .about("Rename an image (the extension is kept when omitted)")
                .arg(Arg::new("name").value_name("NAME").required(true))
                .arg(Arg::new("new-name").value_name("NEW_NAME").required(true)),
        )
        .subcommand(
            Command::new("remove")
                .about("Permanently delete images")
                .arg(names_arg("Image file names"))
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .help("Do not ask for confirmation")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Copy JPG/PNG images into the directory")
                .arg(
                    Arg::new("paths")
                        .value_name("PATH")
                        .num_args(1..)
                        .required(true),
                ),
        )
        .subcommand(Command::new("prune").about("Forget hidden images that no longer exist"))
        .subcommand(
            Command::new("create")
                .about("Create an MP4 slideshow from the visible images")
                .args(view_args())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("NAME")
                        .help("Output file name (default: slideshow_YYYYMMDD_HHMMSS.mp4)"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help("Overwrite an existing output file")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("play")
                        .long("play")
                        .help("Play the slideshow when it is ready")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("videos").about("List slideshows in the output directory"))
        .subcommand(
            Command::new("play")
                .about("Play a slideshow (default: the most recent one)")
                .arg(Arg::new("video").value_name("VIDEO"))
                .arg(
                    Arg::new("player")
                        .short('p')
                        .long("player")
                        .value_name("PLAYER")
                        .help("Player to try first (default: configured preference)"),
                ),
        )
        .subcommand(Command::new("players").about("List detected video players"))
        .subcommand(
            Command::new("settings")
                .about("Show or change settings")
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Where slideshows are saved"),
                )
                .arg(
                    Arg::new("reset-output-dir")
                        .long("reset-output-dir")
                        .help("Save slideshows in the image directory again")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("output-dir"),
                )
                .arg(
                    Arg::new("player")
                        .long("player")
                        .value_name("PLAYER")
                        .help("Preferred video player, or 'auto'"),
                ),
        )
}

fn init_logging(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let default_filter = if matches.get_flag("verbose") { "debug" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if let Some(path) = matches.get_one::<String>("log-file") {
        let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let matches = cli().get_matches();
    init_logging(&matches)?;

    let dir = matches
        .get_one::<String>("dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace = match matches.get_one::<String>("config") {
        Some(config) => Workspace::with_config(&dir, config),
        None => Workspace::open(&dir),
    }
    .map_err(|e| fail(format!("Cannot use {}: {}", dir.display(), e)))?;

    log::info!("Working directory: {}", workspace.root().display());
    let mut catalog = Catalog::open(workspace).map_err(|e| fail(e.to_string()))?;
    print_skipped(catalog.skipped());
    print_warnings(&mut catalog);

    let result = match matches.subcommand() {
        Some(("list", sub)) => list(&catalog, sub),
        Some(("hide", sub)) => set_visibility(&mut catalog, sub, Some(true)),
        Some(("show", sub)) => set_visibility(&mut catalog, sub, Some(false)),
        Some(("toggle", sub)) => set_visibility(&mut catalog, sub, None),
        Some(("rename", sub)) => rename(&mut catalog, sub),
        Some(("remove", sub)) => remove(&mut catalog, sub),
        Some(("add", sub)) => add(&mut catalog, sub),
        Some(("prune", _)) => prune(&mut catalog),
        Some(("create", sub)) => create(&catalog, sub),
        Some(("videos", _)) => videos(&catalog),
        Some(("play", sub)) => play(&catalog, sub),
        Some(("players", _)) => players(&catalog),
        Some(("settings", sub)) => settings(&mut catalog, sub),
        _ => unreachable!("clap requires a subcommand"),
    };

    print_warnings(&mut catalog);
    result
}

fn print_warnings(catalog: &mut Catalog) {
    for warning in catalog.take_warnings() {
        println!("{}: {}", "Warning".yellow(), warning);
    }
}

fn print_skipped(skipped: &[Skipped]) {
    for skip in skipped {
        println!("{} {}: {}", "Skipped".yellow(), skip.path.display(), skip.reason);
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

fn view(catalog: &Catalog, matches: &ArgMatches) -> Result<Vec<ImageEntry>, Box<dyn Error>> {
    let key: SortKey = matches
        .get_one::<String>("sort")
        .map(|s| s.parse::<SortKey>())
        .transpose()?
        .unwrap_or_default();
    let query = matches.get_one::<String>("search").map(String::as_str).unwrap_or("");
    Ok(catalog.view(key, query))
}

fn resolve(catalog: &Catalog, name: &str) -> Result<PathBuf, Box<dyn Error>> {
    catalog
        .find_by_name(name)
        .or_else(|| catalog.get(Path::new(name)))
        .map(|entry| entry.path.clone())
        .ok_or_else(|| fail(format!("No image named '{}'", name)))
}

fn names(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("names")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn list(catalog: &Catalog, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let entries = view(catalog, matches)?;

    if entries.is_empty() {
        println!("{}", "No images found".bold());
        println!("Use 'add' to copy images into {}", catalog.workspace().root().display());
        return Ok(());
    }

    for entry in &entries {
        let status = if entry.hidden {
            "HIDDEN  ".yellow()
        } else {
            "INCLUDED".green()
        };
        println!(
            "{}  {}  {:>8.2} MB  {}",
            status,
            entry.modified_local().format("%Y-%m-%d %H:%M"),
            megabytes(entry.size_bytes),
            entry.display_name.cyan()
        );
    }

    let stats = catalog::summarize(&entries);
    println!(
        "{}: {} images | {}: {} | {}: {} | {}: {:.1} MB",
        "Total".bold().blue(),
        stats.total,
        "Visible".green(),
        stats.visible,
        "Hidden".yellow(),
        stats.hidden,
        "Size".blue(),
        megabytes(stats.total_bytes)
    );
    Ok(())
}

fn set_visibility(catalog: &mut Catalog, matches: &ArgMatches, hidden: Option<bool>) -> Result<(), Box<dyn Error>> {
    let mut failures = 0;
    for name in names(matches) {
        let outcome = resolve(catalog, &name).and_then(|path| match hidden {
            Some(hidden) => catalog.set_hidden(&path, hidden).map(|_| hidden).map_err(Into::into),
            None => catalog.toggle_hidden(&path).map_err(Into::into),
        });
        match outcome {
            Ok(true) => println!("{} {}", "Hidden".yellow(), name),
            Ok(false) => println!("{} {}", "Included".green(), name),
            Err(e) => {
                println!("{}", e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(fail(format!("{} image(s) could not be updated", failures)));
    }
    Ok(())
}

fn rename(catalog: &mut Catalog, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let name = matches.get_one::<String>("name").map(String::as_str).unwrap_or_default();
    let new_name = matches
        .get_one::<String>("new-name")
        .map(String::as_str)
        .unwrap_or_default();

    let path = resolve(catalog, name)?;
    let entry = catalog
        .rename(&path, new_name)
        .map_err(|e| fail(e.to_string()))?;
    println!("{} {} -> {}", "Renamed".green(), name, entry.display_name.cyan());
    Ok(())
}

fn confirm(question: &str) -> io::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn remove(catalog: &mut Catalog, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let skip_confirmation = matches.get_flag("yes");
    let mut failures = 0;

    for name in names(matches) {
        let path = match resolve(catalog, &name) {
            Ok(path) => path,
            Err(e) => {
                println!("{}", e);
                failures += 1;
                continue;
            }
        };

        if !skip_confirmation
            && !confirm(&format!("Permanently delete {}? This cannot be undone.", name))?
        {
            println!("Kept {}", name);
            continue;
        }

        match catalog.remove(&path) {
            Ok(()) => println!("{} {}", "Deleted".green(), name),
            Err(e) => {
                println!("{}", e.to_string().red());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(fail(format!("{} image(s) could not be deleted", failures)));
    }
    Ok(())
}

fn add(catalog: &mut Catalog, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let paths: Vec<PathBuf> = matches
        .get_many::<String>("paths")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();

    let report = catalog.add(&paths);
    for entry in &report.added {
        println!("{} {}", "Added".green(), entry.display_name.cyan());
    }
    print_skipped(&report.skipped);

    if report.added.is_empty() {
        println!("{}", "No images added".yellow());
    } else {
        println!(
            "{} {} image(s), {} skipped",
            "Added".bold().green(),
            report.added.len(),
            report.skipped.len()
        );
    }
    Ok(())
}

fn prune(catalog: &mut Catalog) -> Result<(), Box<dyn Error>> {
    let removed = catalog.prune_stale();
    for path in &removed {
        println!("{} {}", "Forgot".yellow(), path.display());
    }
    println!("{} {} stale hidden path(s)", "Pruned".bold().green(), removed.len());
    Ok(())
}

fn create(catalog: &Catalog, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let entries = view(catalog, matches)?;
    let visible = catalog::visible_paths(&entries);

    let output_dir = catalog.output_directory();
    let output = slideshow::resolve_output(
        &output_dir,
        matches.get_one::<String>("output").map(Path::new),
        &Local::now(),
    );
    if output.exists() && !matches.get_flag("force") {
        return Err(fail(format!(
            "{} already exists, use --force to overwrite",
            output.display()
        )));
    }

    let encoder = FfmpegEncoder::new();
    if !encoder.is_available() {
        println!(
            "{}: ffmpeg was not found on PATH, slideshow creation will fail",
            "Warning".yellow()
        );
    }

    let params = EncodingParams::default();
    println!("{}", "Creating slideshow with settings:".bold().cyan());
    println!("  {}: {}", "Images".green(), visible.len());
    println!("  {}: {} seconds per image", "Timing".green(), params.seconds_per_image);
    println!("  {}: {}x{}", "Resolution".green(), params.width, params.height);
    println!("  {}: {}", "Output".yellow(), output.display());

    let start_time = Instant::now();
    let assembler = Assembler::new(encoder, output_dir);
    let video = assembler
        .create(&visible, Some(output.as_path()))
        .map_err(|e| fail(e.to_string()))?;

    let size = fs::metadata(&video).map(|m| m.len()).unwrap_or(0);
    println!("{}: {}", "Slideshow created successfully".bold().green(), video.display());
    println!("{}: {:.1} MB", "Size".blue(), megabytes(size));
    println!(
        "{}: ~{} seconds",
        "Duration".blue(),
        visible.len() as u64 * u64::from(params.seconds_per_image)
    );
    println!("{}: {:.2?}", "Processing time".blue(), start_time.elapsed());

    if matches.get_flag("play") {
        play_video(catalog, &video, None)?;
    }
    Ok(())
}

fn videos(catalog: &Catalog) -> Result<(), Box<dyn Error>> {
    let output_dir = catalog.output_directory();
    let videos = player::list_videos(&output_dir)?;
    if videos.is_empty() {
        println!("No slideshow videos found in {}", output_dir.display());
        return Ok(());
    }

    for video in &videos {
        let metadata = fs::metadata(video)?;
        let modified: chrono::DateTime<Local> = metadata.modified()?.into();
        println!(
            "{}  {:>8.1} MB  {}",
            modified.format("%Y-%m-%d %H:%M:%S"),
            megabytes(metadata.len()),
            video.file_name().unwrap_or_default().to_string_lossy().cyan()
        );
    }
    Ok(())
}

fn play_video(catalog: &Catalog, video: &Path, player_override: Option<&str>) -> Result<(), Box<dyn Error>> {
    let preference = player_override.unwrap_or(catalog.settings().preferred_player.as_str());
    let candidates = player::candidates(preference, &player::detect_players());
    let used = player::play(video, &candidates).map_err(|e| fail(e.to_string()))?;
    println!("{} {} with {}", "Playing".green(), video.display(), used);
    Ok(())
}

fn play(catalog: &Catalog, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let output_dir = catalog.output_directory();
    let video = match matches.get_one::<String>("video") {
        Some(video) => {
            let video = PathBuf::from(video);
            if video.is_absolute() || video.exists() {
                video
            } else {
                output_dir.join(video)
            }
        }
        None => player::list_videos(&output_dir)?
            .into_iter()
            .next()
            .ok_or_else(|| fail(format!("No slideshow videos found in {}", output_dir.display())))?,
    };

    play_video(
        catalog,
        &video,
        matches.get_one::<String>("player").map(String::as_str),
    )
}

fn players(catalog: &Catalog) -> Result<(), Box<dyn Error>> {
    let available = player::detect_players();
    if available.is_empty() {
        println!("{}", "No video player detected".yellow());
        println!("Install one of: {}", player::PREFERRED_PLAYERS.join(", "));
        return Ok(());
    }

    let preference = &catalog.settings().preferred_player;
    let first = player::candidates(preference, &available).into_iter().next();
    for name in &available {
        if Some(name) == first.as_ref() {
            println!("{} {}", name.cyan(), "(used)".green());
        } else {
            println!("{}", name);
        }
    }
    Ok(())
}

fn settings(catalog: &mut Catalog, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        let dir = fs::canonicalize(dir).map_err(|e| fail(format!("Cannot use {}: {}", dir, e)))?;
        catalog.set_output_directory(Some(dir));
    } else if matches.get_flag("reset-output-dir") {
        catalog.set_output_directory(None);
    }
    if let Some(player) = matches.get_one::<String>("player") {
        catalog.set_preferred_player(player.as_str());
    }

    let settings = catalog.settings();
    println!("{}", "Settings:".bold().cyan());
    println!("  {}: {}", "Images".green(), catalog.workspace().root().display());
    println!("  {}: {}", "Config".green(), catalog.workspace().config_path().display());
    println!("  {}: {}", "Output directory".green(), catalog.output_directory().display());
    println!(
        "  {}: {}",
        "Player".green(),
        if settings.preferred_player.is_empty() {
            AUTO_PLAYER
        } else {
            settings.preferred_player.as_str()
        }
    );
    println!("  {}: {}", "Hidden images".green(), settings.hidden.len());
    Ok(())
}
