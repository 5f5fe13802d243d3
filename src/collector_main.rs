#[cfg(not(target_os = "espidf"))]
mod host {
    use anyhow::{Context, Result};
    use clap::Parser;
    use log::info;
    use rssi_beacon::collector::{receiver_pair, Collector};
    use rssi_beacon::dmx::open_serial;
    use std::net::{SocketAddr, UdpSocket};
    use std::num::NonZeroU32;

    #[derive(Parser, Debug, Clone)]
    #[command(
        name = "rssi-collector",
        version,
        about = "Receive RX<id>:<rssi> beacon reports, log them per receiver and steer a DMX moving head"
    )]
    struct Args {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:12345")]
        bind: SocketAddr,
        /// Two receiver ids, e.g. `1,2`, to combine into a position estimate
        #[arg(long, value_delimiter = ',', num_args = 2)]
        pair: Vec<NonZeroU32>,
        /// USB-DMX serial device; pan and tilt follow the position estimate
        #[arg(long, requires = "pair")]
        dmx_port: Option<String>,
    }

    fn init_tracing() -> Result<()> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into());
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
        Ok(())
    }

    pub fn run() -> Result<()> {
        let args = Args::parse();
        init_tracing()?;

        let pair = receiver_pair(&args.pair)?;
        let dmx = args.dmx_port.as_deref().map(open_serial).transpose()?;
        if let Some(port) = &args.dmx_port {
            info!("DMX output on {}", port);
        }

        let socket = UdpSocket::bind(args.bind)
            .with_context(|| format!("failed to bind {}", args.bind))?;
        info!("Waiting for beacon reports on {}", socket.local_addr()?);

        Collector::new().serve(&socket, pair, dmx)
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    host::run()
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("rssi-collector runs on the host, not on the beacon")
}
