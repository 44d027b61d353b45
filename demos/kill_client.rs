use std::env;

use ovpn_mgmt::{ConnectOptions, KillTarget, Session};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let common_name = env::args().nth(1).ok_or("usage: kill_client <common-name>")?;
    let mut session = Session::open(&ConnectOptions::new("127.0.0.1", 7505))?;
    let reply = session.kill(&KillTarget::CommonName(common_name))?;
    println!("{reply}");
    session.close()?;
    Ok(())
}
