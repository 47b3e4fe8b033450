//! Console input: one line per command, plain text is chat.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Chat(String),
    File(PathBuf),
    Snap(PathBuf),
    Loc { lat: f64, lon: f64 },
    Heading(f64),
    Where,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  <text>            send a chat message
  /file <path>      send an encrypted file
  /snap <path>      send an image as a snapshot
  /loc <lat> <lon>  share your position
  /heading <deg>    set the compass heading
  /where            show bearing and distance to the peer
  /quit             close the channel and exit";

/// Parse one input line. `Ok(None)` for blank lines.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Chat(line.to_string())));
    };
    // "//text" sends "/text" as chat
    if rest.starts_with('/') {
        return Ok(Some(Command::Chat(rest.to_string())));
    }
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (rest, ""),
    };
    let cmd = match name {
        "file" => Command::File(path_arg(name, args)?),
        "snap" => Command::Snap(path_arg(name, args)?),
        "loc" => {
            let mut it = args.split_whitespace();
            let (Some(lat), Some(lon), None) = (it.next(), it.next(), it.next()) else {
                bail!("usage: /loc <lat> <lon>");
            };
            Command::Loc {
                lat: number(lat)?,
                lon: number(lon)?,
            }
        }
        "heading" => {
            if args.is_empty() {
                bail!("usage: /heading <deg>");
            }
            Command::Heading(number(args)?)
        }
        "where" => Command::Where,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command /{other}, try /help"),
    };
    Ok(Some(cmd))
}

fn path_arg(name: &str, args: &str) -> Result<PathBuf> {
    if args.is_empty() {
        bail!("usage: /{name} <path>");
    }
    Ok(PathBuf::from(args))
}

fn number(s: &str) -> Result<f64> {
    let n: f64 = s.parse().with_context(|| format!("not a number: {s}"))?;
    if !n.is_finite() {
        bail!("not a finite number: {s}");
    }
    Ok(n)
}

/// Reduce a peer-supplied name to a single safe path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `dir/name`, or `dir/name-N.ext` for the first N that is free.
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let p = Path::new(name);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = p.extension().and_then(|s| s.to_str());
    (1u32..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}-{n}.{ext}")),
            None => dir.join(format!("{stem}-{n}")),
        })
        .find(|p| !p.exists())
        .unwrap_or(first)
}
