use clap::Parser;
use tapflow::{Agent, Direction, FlowRule, Mode};
use tokio::signal;

#[derive(Debug, Parser)]
pub struct Opt {
    #[arg(short, long, default_value = "eth0")]
    iface: String,
    /// Compiled eBPF object, as produced by `cargo xtask build-ebpf`.
    #[arg(
        long,
        default_value = "tapflow-ebpf/target/bpfel-unknown-none/release/tapflow"
    )]
    object: String,
    /// Record matches without dropping anything.
    #[arg(long)]
    observe: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let opt = Opt::parse();
    tracing_subscriber::fmt::init();

    let mut agent = Agent::new(&opt.iface, &opt.object)?;

    if opt.observe {
        agent.set_mode(Mode::Observe)?;
    }

    // Ingress DNS: the gated port plus the three always-counted fields.
    agent.set_rule(
        0,
        &FlowRule::new()
            .with_dst_port(53)
            .with_protocol(17)
            .with_direction(Direction::Ingress)
            .with_threshold(4),
    )?;

    // Outbound HTTP requests for exactly /admin.
    let admin_rule = FlowRule::new()
        .with_protocol(6)
        .with_direction(Direction::Egress)
        .with_threshold(4)
        .with_path("/admin")?;
    agent.set_rule(1, &admin_rule)?;

    // Outbound lookups of example.com, threshold derived from the rule itself.
    let lookup_rule = FlowRule::new()
        .with_protocol(17)
        .with_direction(Direction::Egress)
        .with_query_name("example.com")?
        .require_full_match();
    agent.set_rule(2, &lookup_rule)?;

    agent.start_logging();

    tracing::info!("Agent started");
    signal::ctrl_c().await?;
    tracing::info!("Exiting...");

    Ok(())
}
