//! Command-line arguments for the `pipegraph` binary.

use crate::manager::LinkSpec;
use crate::protocol::ParamValue;
use clap::Parser;
use std::path::PathBuf;

/// Build and run a node graph from the command line.
///
/// Nodes are named in creation order: two `--node sine` flags create
/// `sine0` and `sine1`.
#[derive(Debug, Clone, Parser)]
#[command(name = "pipegraph", version, about, long_about = None)]
pub struct CliArgs {
    /// Engine configuration file (TOML). Defaults apply when omitted.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Node type to create; repeatable
    #[arg(long = "node", value_name = "TYPE")]
    pub nodes: Vec<String>,

    /// Link to install, as `out_node.slot:in_node.slot`; repeatable
    #[arg(long = "link", value_name = "OUT.SLOT:IN.SLOT", value_parser = parse_link)]
    pub links: Vec<LinkSpec>,

    /// Parameter to set, as `node.group.name=value`; repeatable
    #[arg(long = "param", value_name = "NODE.GROUP.NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<ParamAssignment>,

    /// Seconds to run before terminating. 0 runs until stdin is closed.
    #[arg(long, value_name = "SECS", default_value_t = 0.0)]
    pub duration: f64,

    /// Print the registered node types and exit
    #[arg(long)]
    pub list_nodes: bool,
}

/// A `--param` flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamAssignment {
    pub node: String,
    pub group: String,
    pub name: String,
    pub value: ParamValue,
}

fn split_endpoint(s: &str) -> Result<(String, String), String> {
    match s.split_once('.') {
        Some((node, slot)) if !node.is_empty() && !slot.is_empty() => {
            Ok((node.to_string(), slot.to_string()))
        }
        _ => Err(format!("expected `node.slot`, got `{s}`")),
    }
}

/// Parse `out_node.slot:in_node.slot`.
pub fn parse_link(s: &str) -> Result<LinkSpec, String> {
    let (out, inp) = s
        .split_once(':')
        .ok_or_else(|| format!("expected `out_node.slot:in_node.slot`, got `{s}`"))?;
    let (node_out, slot_out) = split_endpoint(out.trim())?;
    let (node_in, slot_in) = split_endpoint(inp.trim())?;
    Ok(LinkSpec::new(node_out, node_in, slot_out, slot_in))
}

/// Parse `node.group.name=value`.
pub fn parse_param(s: &str) -> Result<ParamAssignment, String> {
    let (path, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `node.group.name=value`, got `{s}`"))?;
    let parts: Vec<&str> = path.trim().split('.').collect();
    let [node, group, name] = parts.as_slice() else {
        return Err(format!("expected `node.group.name`, got `{path}`"));
    };
    if node.is_empty() || group.is_empty() || name.is_empty() {
        return Err(format!("empty component in `{path}`"));
    }
    Ok(ParamAssignment {
        node: node.to_string(),
        group: group.to_string(),
        name: name.to_string(),
        value: ParamValue::parse_literal(value),
    })
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link() {
        let link = parse_link("sine0.out:psd0.data").unwrap();
        assert_eq!(link, LinkSpec::new("sine0", "psd0", "out", "data"));
        assert!(parse_link("sine0.out").is_err());
        assert!(parse_link("sine0:psd0.data").is_err());
        assert!(parse_link(".out:psd0.data").is_err());
    }

    #[test]
    fn test_parse_param_literals() {
        let p = parse_param("sine0.sine.frequency=12.5").unwrap();
        assert_eq!(p.node, "sine0");
        assert_eq!(p.group, "sine");
        assert_eq!(p.name, "frequency");
        assert_eq!(p.value, ParamValue::Float(12.5));

        let p = parse_param("psd0.psd.method=welch").unwrap();
        assert_eq!(p.value, ParamValue::String("welch".into()));
        let p = parse_param("sine0.common.autotrigger=false").unwrap();
        assert_eq!(p.value, ParamValue::Bool(false));
    }

    #[test]
    fn test_parse_param_rejects_bad_paths() {
        assert!(parse_param("sine0.frequency=1").is_err());
        assert!(parse_param("sine0.sine.frequency").is_err());
        assert!(parse_param("a.b.c.d=1").is_err());
    }

    #[test]
    fn test_full_command_line() {
        let args = CliArgs::try_parse_from([
            "pipegraph",
            "--node",
            "sine",
            "--node",
            "psd",
            "--link",
            "sine0.out:psd0.data",
            "--param",
            "psd0.psd.f_max=40",
            "--duration",
            "2.5",
        ])
        .unwrap();
        assert_eq!(args.nodes, vec!["sine", "psd"]);
        assert_eq!(args.links.len(), 1);
        assert_eq!(args.params[0].value, ParamValue::Int(40));
        assert_eq!(args.duration, 2.5);
        assert!(!args.list_nodes);
    }
}
