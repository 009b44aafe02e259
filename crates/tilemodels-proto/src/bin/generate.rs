//! Regenerates `src/generated/mod.rs` from `proto/vector_tile.proto`.
//!
//! ```sh
//! cargo run -p tilemodels-proto --bin generate
//! cargo run -p tilemodels-proto --bin generate -- --check
//! ```
//!
//! `--check` leaves the tree untouched and fails if the committed module is
//! stale. Requires `protoc`.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    process::{Command, ExitCode, Stdio},
};

const HEADER: &str = "\
// Generated from proto/vector_tile.proto. Do not edit manually.
// Regenerate with: cargo run -p tilemodels-proto --bin generate

#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]

";

/// Prefix prost output with the module header, dropping prost's own
/// leading blank lines.
fn with_header(generated: &str) -> String {
    let mut module = String::from(HEADER);
    module.push_str(generated.trim_start_matches('\n'));
    if !module.ends_with('\n') {
        module.push('\n');
    }
    module
}

/// Run prost into a scratch directory and return the `vector_tile` package
/// source.
fn compile(proto_dir: &Path) -> io::Result<String> {
    let scratch = env::temp_dir().join(format!("tilemodels-proto-{}", std::process::id()));
    fs::create_dir_all(&scratch)?;
    let result = prost_build::Config::new()
        .out_dir(&scratch)
        .compile_protos(&[proto_dir.join("vector_tile.proto")], &[proto_dir])
        .and_then(|()| fs::read_to_string(scratch.join("vector_tile.rs")));
    let _ = fs::remove_dir_all(&scratch);
    result
}

/// Format through `rustfmt` on stdin, falling back to the input if
/// `rustfmt` is unavailable.
fn rustfmt(source: String) -> io::Result<String> {
    let child = Command::new("rustfmt")
        .args(["--edition", "2024", "--emit", "stdout"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn();
    let Ok(mut child) = child else {
        eprintln!("rustfmt not found, writing unformatted output");
        return Ok(source);
    };
    if let Some(mut stdin) = child.stdin.take() {
        io::Write::write_all(&mut stdin, source.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        eprintln!("rustfmt exited with {}", output.status);
        return Ok(source);
    }
    String::from_utf8(output.stdout).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn run(check: bool) -> io::Result<bool> {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))?;
    let target = manifest_dir.join("src/generated/mod.rs");
    let module = rustfmt(with_header(&compile(&manifest_dir.join("proto"))?))?;

    let current = fs::read_to_string(&target).unwrap_or_default();
    if current == module {
        println!("{} is up to date", target.display());
        return Ok(true);
    }
    if check {
        eprintln!("{} is stale", target.display());
        return Ok(false);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, module)?;
    println!("wrote {}", target.display());
    Ok(true)
}

fn main() -> ExitCode {
    let check = env::args().skip(1).any(|arg| arg == "--check");
    match run(check) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("generation failed: {error}");
            ExitCode::FAILURE
        }
    }
}
