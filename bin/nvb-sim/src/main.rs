use std::path::PathBuf;

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::info;
use rand::{Rng, RngCore};

use nvb_core::{AddrType, Chip, ConnHandle, Ediv, GapAddr, Role};
use nvb_linux::{FileFlash, HostStack};
use nvb_store::{BondConfig, BondManager};

type Manager = BondManager<FileFlash, HostStack>;

#[derive(Parser)]
#[command(name = "nvb-sim", about = "Drive the bond store against a flash image file")]
struct Cli {
    #[arg(long, default_value = "bond.img")] image: PathBuf,
    #[arg(long, value_enum, default_value_t = ChipArg::Nrf52832)] chip: ChipArg,
    #[command(subcommand)] cmd: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChipArg { Nrf52832, Nrf52840 }

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg { Peripheral, Central }

#[derive(Clone, Copy, ValueEnum)]
enum ClearScope { All, Peripheral, Central }

#[derive(Subcommand)]
enum Cmd {
    /// Pair with a random peer and persist keys + CCCD.
    Pair {
        #[arg(long, value_enum, default_value_t = RoleArg::Peripheral)] role: RoleArg,
        #[arg(long, default_value_t = 0)] conn: ConnHandle,
        #[arg(long)] name: Option<String>,
        #[arg(long, default_value_t = 8)] cccd_len: usize,
    },
    /// Load keys and apply CCCD to a fresh connection.
    Load {
        #[arg(long, value_enum, default_value_t = RoleArg::Peripheral)] role: RoleArg,
        #[arg(long, value_parser = parse_ediv, default_value = "0")] ediv: Ediv,
        #[arg(long, default_value_t = 1)] conn: ConnHandle,
    },
    List {
        #[arg(long, value_enum, default_value_t = RoleArg::Peripheral)] role: RoleArg,
    },
    /// Look up a central by address (AA:BB:CC:DD:EE:FF).
    Find {
        #[arg(long, value_parser = parse_addr)] addr: GapAddr,
    },
    Clear {
        #[arg(value_enum, default_value_t = ClearScope::All)] scope: ClearScope,
    },
    Remove {
        #[arg(long, value_enum)] role: RoleArg,
        #[arg(long, value_parser = parse_ediv)] ediv: Ediv,
    },
}

impl From<ChipArg> for Chip {
    fn from(c: ChipArg) -> Self {
        match c {
            ChipArg::Nrf52832 => Chip::Nrf52832,
            ChipArg::Nrf52840 => Chip::Nrf52840,
        }
    }
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Peripheral => Role::Peripheral,
            RoleArg::Central => Role::Central,
        }
    }
}

/// Hex, with or without `0x`.
fn parse_ediv(s: &str) -> Result<Ediv, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    Ediv::from_str_radix(digits, 16).map_err(|e| format!("bad ediv '{}': {}", s, e))
}

/// Display order (MSB first) in, stack order (LSB first) out. The address
/// type follows from the two most significant bits.
fn parse_addr(s: &str) -> Result<GapAddr, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 6 {
        return Err(format!("expected 6 octets, got {}", parts.len()));
    }
    let mut addr = [0u8; 6];
    for (dst, part) in addr.iter_mut().rev().zip(parts) {
        *dst = u8::from_str_radix(part, 16).map_err(|e| format!("bad octet '{}': {}", part, e))?;
    }
    let addr_type = match addr[5] >> 6 {
        0b01 => AddrType::RandomPrivateResolvable,
        0b11 => AddrType::RandomStatic,
        _ => AddrType::Public,
    };
    Ok(GapAddr::new(addr_type, addr))
}

fn random_static_addr() -> GapAddr {
    let mut addr: [u8; 6] = rand::thread_rng().gen();
    addr[5] |= 0xC0;
    GapAddr::new(AddrType::RandomStatic, addr)
}

fn pair(manager: &Manager, role: Role, conn: ConnHandle, name: Option<&str>, cccd_len: usize) -> anyhow::Result<()> {
    // 1. Link up, peer subscribes
    let stack = manager.store().stack();
    let peer = random_static_addr();
    stack.connect(conn, name);
    let mut attrs = vec![0u8; cccd_len];
    rand::thread_rng().fill_bytes(&mut attrs);
    stack.subscribe(conn, &attrs);

    // 2. Pairing complete: persist through the worker
    let bdata = stack.pair(conn, peer);
    let ediv = bdata.ediv_for(role);
    let worker = manager.spawn_worker()?;
    let keys_ok = manager.save_keys(role, conn, &bdata);
    let cccd_ok = manager.save_cccd(role, conn, ediv);

    // 3. Drain before the image is dropped
    worker.shutdown();

    if !keys_ok { bail!("keys not accepted"); }
    println!("{} {} as {:?}, ediv {}", "BONDED".green().bold(), peer, role, format!("0x{:04X}", ediv).cyan());
    if !cccd_ok { println!("{}", "CCCD not queued".yellow()); }
    Ok(())
}

fn load(manager: &Manager, role: Role, ediv: Ediv, conn: ConnHandle) {
    let Some(bdata) = manager.load_keys(role, ediv) else {
        println!("{}", "no bond stored".yellow());
        return;
    };
    let name = manager.load_peer_name().map(|n| n.to_string()).unwrap_or_default();
    println!(
        "{} \"{}\" [{}] ediv {} ltk_len {} lesc {}",
        "KEYS".green().bold(),
        name,
        bdata.peer_addr(),
        format!("0x{:04X}", bdata.ediv_for(role)).cyan(),
        bdata.own_enc.ltk_len,
        bdata.own_enc.lesc
    );

    let stack = manager.store().stack();
    stack.connect(conn, None);
    if manager.load_cccd(role, conn, bdata.ediv_for(role)) {
        let applied = stack.applied_attrs(conn).unwrap_or_default();
        println!("{} {} bytes applied on conn {}", "CCCD".green().bold(), applied.len(), conn);
    } else {
        println!("{} empty attribute set on conn {}", "CCCD".yellow().bold(), conn);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = BondConfig::for_chip(cli.chip.into());
    let flash = FileFlash::open(&cli.image, config.layout.base, config.layout.region_size)?;
    let manager = BondManager::new(flash, HostStack::new(), config)
        .map_err(|e| anyhow!("bond store config: {}", e))?;
    info!("Image {} @ 0x{:05X}", cli.image.display(), config.layout.base);

    match cli.cmd {
        Cmd::Pair { role, conn, name, cccd_len } => {
            pair(&manager, role.into(), conn, name.as_deref(), cccd_len)?;
        }
        Cmd::Load { role, ediv, conn } => load(&manager, role.into(), ediv, conn),
        Cmd::List { role } => {
            manager.print_list(role.into());
            let bonds = manager.list_bonds(role.into());
            if bonds.is_empty() { println!("{}", "no bonds".yellow()); }
            for entry in bonds {
                println!("  {} : {} [{}]", format!("{:04X}", entry.ediv).cyan(), entry.name, entry.peer_addr);
            }
        }
        Cmd::Find { addr } => match manager.find_central_by_address(&addr) {
            Some(bdata) => println!("{} {} -> {}", "FOUND".green().bold(), addr, bdata.peer_addr()),
            None => println!("{} {}", "UNKNOWN".red().bold(), addr),
        },
        Cmd::Clear { scope } => {
            let ok = match scope {
                ClearScope::All => manager.clear_all(),
                ClearScope::Peripheral => manager.clear_peripheral(),
                ClearScope::Central => manager.clear_central(),
            };
            if !ok { bail!("clear failed"); }
            println!("{}", "CLEARED".green().bold());
        }
        Cmd::Remove { role, ediv } => {
            if manager.remove_key(role.into(), ediv) {
                println!("{} 0x{:04X}", "REMOVED".green().bold(), ediv);
            } else {
                println!("{} no bond with ediv 0x{:04X}", "KEPT".yellow().bold(), ediv);
            }
        }
    }
    Ok(())
}
