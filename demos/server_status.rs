use std::env;

use ovpn_mgmt::{ConnectOptions, Session};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = env::var("OVPN_MGMT_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port = env::var("OVPN_MGMT_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(7505);
    let mut opts = ConnectOptions::new(host, port);
    if let Ok(password) = env::var("OVPN_MGMT_PASSWORD") {
        opts = opts.password(password);
    }

    let mut session = Session::open(&opts)?;
    let stats = session.stats()?;
    println!(
        "{} client(s), {} bytes in, {} bytes out",
        stats.clients, stats.bytes_download, stats.bytes_upload
    );

    let report = session.status()?;
    for (cn, connections) in &report.clients {
        for c in connections {
            println!("{cn} from {} since {}", c.real_address, c.connected_since);
        }
    }
    for (vaddr, route) in &report.routes {
        println!("{vaddr} -> {} ({})", route.common_name, route.real_address);
    }
    session.close()?;
    Ok(())
}
