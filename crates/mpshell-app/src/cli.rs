use std::path::PathBuf;

use clap::Parser;

use crate::renderer::types::DisplaySize;

/// Windowed presentation shell for an out-of-process video decoder.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mpshell", version)]
pub struct Cli {
    /// Settings file to use instead of the per-user one.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address the frame-delivery protocol listens on.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Name of the shared frame segment agreed with the decoder.
    #[arg(long, value_name = "NAME")]
    pub buffer_name: Option<String>,

    /// Directory holding the shared frame segment.
    #[arg(long, value_name = "DIR")]
    pub buffer_dir: Option<PathBuf>,

    /// Enter fullscreen when the first stream starts.
    #[arg(long)]
    pub fullscreen: bool,

    /// Keep the window above others.
    #[arg(long)]
    pub ontop: bool,

    /// Feed a generated test pattern of the given size instead of waiting for a decoder.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub test_pattern: Option<DisplaySize>,

    /// Player command line. `{buffer}` and `{addr}` in its arguments are substituted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "PLAYER")]
    pub player: Vec<String>,
}

fn parse_size(s: &str) -> Result<DisplaySize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid dimension '{v}'"))
    };
    Ok(DisplaySize::new(parse(w)?, parse(h)?))
}
