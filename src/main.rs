use image::error::ImageError;

use quadtree_frames::error::{BuildError, DrawError, QueryError};
use quadtree_frames::frames::{self, FrameError};
use quadtree_frames::{BuildConfig, GifOptions, QuadTree};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::str::FromStr;

/// Helper function for `main`.
fn error_exit(msg: &str, code: i32) -> ! {
	eprintln!("{}", msg);
	std::process::exit(code)
}

/// Parses an optional numeric flag, falling back to `default`.
fn numeric<T: FromStr>(matches: &clap::ArgMatches, name: &str, default: T) -> T {
	match matches.value_of(name) {
		None => default,
		Some(v) => match v.parse() {
			Ok(n) => n,
			Err(_) => error_exit(&format!("Non-numeric value for {}", name), 2),
		},
	}
}

fn image_error_exit(e: &ImageError) -> ! {
	let (msg, code) = match e {
		ImageError::Decoding(_) | ImageError::Unsupported(_) => ("Invalid image data", 4),
		ImageError::Limits(_) => ("Computation limits exceeded", 5),
		ImageError::IoError(_) => ("File not found or could not be read", 3),
		_ => ("An error occurred", 10),
	};
	error_exit(msg, code)
}

fn frame_error_exit(e: &FrameError) -> ! {
	match e {
		FrameError::Load { source, .. } => image_error_exit(source),
		FrameError::Query(QueryError::InvalidDepth { .. }) => error_exit(&e.to_string(), 2),
		FrameError::Build(_) => error_exit(&e.to_string(), 10),
	}
}

/// Strips the extension from `path`.
fn stem(path: &str) -> String {
	path.rsplitn(2, '.').last().unwrap_or(path).to_string()
}

fn read_trees(input_path: &str) -> Vec<QuadTree> {
	let source_data = match std::fs::read(input_path) {
		Ok(d) => d,
		Err(_) => error_exit("File not found or could not be read", 3),
	};
	match quadtree_frames::from_qtf(&source_data) {
		Ok(trees) => trees,
		Err(e) => error_exit(&format!("Invalid tree data: {}", e), 4),
	}
}

/// `clap`-based CLI for turning frames into quadtrees and back.
///
/// May exit process with status code if there are errors:
///
/// 1: `clap` error
///
/// 2: invalid arguments
///
/// 3: file I/O issues
///
/// 4: invalid image data
///
/// 5: computation limits exceeded
///
/// 10: other, potentially unknown error
fn main() {
	tracing_subscriber::fmt().with_writer(std::io::stderr).init();

	let clap_matches = clap::App::new("quadtree_frames")
		.version("0.1.0")
		.author("vkcz")
		.about("Decomposes images or frame sequences into detail-driven quadtrees (QTF) and renders them back.")
		.arg_from_usage("-i, --into 'Build quadtrees from the input images, one per frame, into a QTF file'")
		.arg_from_usage("-f, --from 'Render the frames of a QTF file to PNG, or GIF with --gif'")
		.arg_from_usage("-c, --cells 'List the rendered cells of a QTF file as column,row,#rrggbb lines'")
		.arg_from_usage("-m, --max-depth=[N] 'Maximum subdivision depth (--into only); defaults to 8'")
		.arg_from_usage("-t, --threshold=[N] 'Detail at or below which a region is not split (--into only); defaults to 13'")
		.arg_from_usage("-p, --parallel-depth=[N] 'Depth above which quadrants are built in parallel (--into only); defaults to 3'")
		.arg_from_usage("-j, --threads=[N] 'Worker threads; defaults to one per core'")
		.arg_from_usage("-w, --width=[N] 'Rescale frames to this width before building (--into only)'")
		.arg_from_usage("-d, --depth=[N] 'Depth to render (--from/--cells only); defaults to the maximum of each tree'")
		.arg_from_usage("-l, --lines 'Outline every quadrant in black (--from/--cells only)'")
		.arg_from_usage("-g, --gif 'Write one animated GIF per frame instead of PNGs (--from only)'")
		.arg_from_usage("--duration=[MS] 'GIF frame duration in milliseconds; defaults to 1000'")
		.arg_from_usage("--loop=[N] 'GIF repetitions, 0 for forever; defaults to 0'")
		.arg_from_usage("-o, --output=[PATH] 'Output file or file prefix; defaults to the input path with a modified extension'")
		.arg_from_usage("<INPUT>... 'Input files: images for --into, one QTF file otherwise'")
		.get_matches();

	let inputs = clap_matches.values_of("INPUT")
		.map(|v| v.collect::<Vec<_>>())
		.unwrap_or_default();
	let threads = clap_matches.value_of("threads").map(|_| numeric(&clap_matches, "threads", 0usize));
	let depth = clap_matches.value_of("depth").map(|_| numeric(&clap_matches, "depth", 0u32));
	let lines = clap_matches.is_present("lines");

	let modes = (
		clap_matches.is_present("into"),
		clap_matches.is_present("from"),
		clap_matches.is_present("cells"),
	);
	match modes {
		(true, false, false) => {
			let config = BuildConfig::default()
				.with_max_depth(numeric(&clap_matches, "max-depth", 8))
				.with_detail_threshold(numeric(&clap_matches, "threshold", 13.))
				.with_parallel_depth(numeric(&clap_matches, "parallel-depth", 3))
				.with_threads(threads);
			let width = clap_matches.value_of("width").map(|_| numeric(&clap_matches, "width", 0u32));
			if width == Some(0) {
				error_exit("Width must be positive", 2);
			}

			let source = match frames::load_frames(&inputs, width) {
				Ok(f) => f,
				Err(e) => frame_error_exit(&e),
			};
			let trees = match frames::build_batch(&source, &config) {
				Ok(t) => t,
				Err(FrameError::Build(BuildError::InvalidConfig(msg))) => error_exit(&msg, 2),
				Err(FrameError::Build(BuildError::EmptyImage { .. })) => error_exit("Input image has invalid dimensions", 4),
				Err(e) => error_exit(&e.to_string(), 10),
			};
			for (index, tree) in trees.iter().enumerate() {
				tracing::info!(
					frame = index,
					max_depth = tree.max_depth(),
					leaves = tree.root().leaf_count(),
					"frame decomposed"
				);
			}

			let qtf_data = match quadtree_frames::to_qtf(&trees) {
				Ok(d) => d,
				Err(e) => error_exit(&e.to_string(), 5),
			};
			let output = clap_matches.value_of("output")
				.map(str::to_string)
				.unwrap_or_else(|| stem(inputs[0]) + ".qtf");
			if std::fs::write(&output, &qtf_data).is_err() {
				error_exit("Could not write to output file", 3);
			}
		},
		(false, true, false) => {
			if inputs.len() != 1 {
				error_exit("Exactly one QTF input is required", 2);
			}
			let trees = read_trees(inputs[0]);
			let prefix = clap_matches.value_of("output")
				.map(str::to_string)
				.unwrap_or_else(|| stem(inputs[0]));

			if clap_matches.is_present("gif") {
				let options = GifOptions {
					duration_ms: numeric(&clap_matches, "duration", 1000),
					loop_count: numeric(&clap_matches, "loop", 0),
					lines,
				};
				for (index, tree) in trees.iter().enumerate() {
					let path = format!("{}_{}.gif", prefix, index);
					let out_fh = match File::create(&path) {
						Ok(f) => f,
						Err(_) => error_exit("Could not open output file", 3),
					};
					match tree.write_gif(BufWriter::new(out_fh), &options) {
						Ok(()) => {},
						Err(DrawError::Encode(e)) => image_error_exit(&e),
						Err(DrawError::Io(_)) => error_exit("Could not write to output file", 3),
					}
				}
			} else {
				let renders = match frames::render_batch(&trees, depth, lines) {
					Ok(r) => r,
					Err(e) => frame_error_exit(&e),
				};
				for (index, render) in renders.iter().enumerate() {
					if render.save(format!("{}_{}.png", prefix, index)).is_err() {
						error_exit("Could not save output", 3);
					}
				}
			}
		},
		(false, false, true) => {
			if inputs.len() != 1 {
				error_exit("Exactly one QTF input is required", 2);
			}
			let trees = read_trees(inputs[0]);
			let renders = match frames::render_batch(&trees, depth, lines) {
				Ok(r) => r,
				Err(e) => frame_error_exit(&e),
			};
			let mut out: Box<dyn Write> = match clap_matches.value_of("output") {
				Some(path) => match File::create(path) {
					Ok(f) => Box::new(BufWriter::new(f)),
					Err(_) => error_exit("Could not open output file", 3),
				},
				None => Box::new(BufWriter::new(std::io::stdout())),
			};
			let written = renders.iter().enumerate().try_for_each(|(index, render)| {
				writeln!(out, "frame {}", index + 1)?;
				for cell in frames::pixel_cells(render, frames::DEFAULT_MARGIN) {
					writeln!(out, "{},{},{}", cell.column, cell.row, cell.hex)?;
				}
				Ok::<_, std::io::Error>(())
			});
			if written.and_then(|_| out.flush()).is_err() {
				error_exit("Could not write cell list", 3);
			}
		},
		(false, false, false) => error_exit("One of -i/--into, -f/--from and -c/--cells must be present", 2),
		_ => error_exit("Only one of -i/--into, -f/--from and -c/--cells may be present", 2),
	}
}
