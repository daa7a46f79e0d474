use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::PathBuf;

use vmm::{AddressSpace, EmulatedMemory, Geometry, ReadPolicy};
use vmsim::{parse_script, replay};

mod console;

use console::Console;

#[derive(Parser)]
#[command(name = "vmsim")]
#[command(about = "Emulated page-table MMU with swap")]
struct Args {
    /// Bits of a virtual address that select the word inside a page
    #[arg(long, global = true, default_value_t = 4)]
    offset_width: u32,

    /// Total width of a virtual address in bits
    #[arg(long, global = true, default_value_t = 20)]
    address_width: u32,

    /// Number of table levels
    #[arg(long, global = true, default_value_t = 4)]
    depth: usize,

    /// Number of physical frames, the root table included
    #[arg(long, global = true, default_value_t = 64)]
    frames: usize,

    /// What reading an unmapped address does
    #[arg(long, global = true, value_enum, default_value_t = Policy::Allocate)]
    read_policy: Policy,

    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a script of reads and writes
    Run {
        /// Script file, one `read <vaddr>` or `write <vaddr> <value>` per line
        script: PathBuf,
    },
    /// Print the constants derived from the geometry flags
    Geometry,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Map the page on first touch, reading zero or the swapped content
    Allocate,
    /// Fail when the page is not resident
    NotPresent,
}

impl From<Policy> for ReadPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Allocate => ReadPolicy::Allocate,
            Policy::NotPresent => ReadPolicy::NotPresent,
        }
    }
}

fn run(
    geometry: Geometry,
    policy: ReadPolicy,
    script: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(&script)
        .map_err(|e| format!("Failed to read {}: {}", script.display(), e))?;
    let accesses = parse_script(&text)?;
    log::info!("replaying {} accesses from {}", accesses.len(), script.display());

    let mut space =
        AddressSpace::new(geometry, EmulatedMemory::new(geometry)).with_read_policy(policy);
    let result = replay(&mut space, &accesses)?;

    for (address, value) in &result.reads {
        println!("{}: {}", address, value);
    }

    let stats = space.stats();
    let resident = space.resident_pages()?;
    println!(
        "{} reads, {} writes, {} translations",
        result.reads.len(),
        result.writes,
        stats.translations
    );
    println!(
        "frames: {} grown, {} tables reused, {} orphans reclaimed",
        stats.frames_grown, stats.tables_reused, stats.orphans_reclaimed
    );
    println!(
        "swap: {} evictions, {} restores, {} pages swapped out",
        stats.evictions,
        space.memory().restores(),
        space.memory().swapped_pages()
    );
    println!(
        "resident: {} pages in {} of {} frames",
        resident.len(),
        space.check()?,
        geometry.num_frames()
    );

    Ok(())
}

fn print_geometry(geometry: &Geometry) {
    println!("offset width:       {}", geometry.offset_width());
    println!("address width:      {}", geometry.virtual_address_width());
    println!("tables depth:       {}", geometry.tables_depth());
    println!("frames:             {}", geometry.num_frames());
    println!("frame size:         {} words", geometry.frame_size());
    println!("pages:              {}", geometry.num_pages());
    println!("RAM size:           {} words", geometry.ram_size());
    println!("virtual memory:     {} words", geometry.virtual_memory_size());

    let bits: Vec<String> = geometry
        .bits_per_level()
        .iter()
        .map(|bits| bits.to_string())
        .collect();
    println!("bits per level:     {}", bits.join(" "));
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    Console::init(Console::level_for(args.verbose))?;

    let geometry = Geometry::new(args.offset_width, args.address_width, args.depth, args.frames)?;
    log::debug!(
        "{} frames of {} words, level bits {:?}",
        geometry.num_frames(),
        geometry.frame_size(),
        geometry.bits_per_level()
    );

    match args.command {
        Command::Run { script } => run(geometry, args.read_policy.into(), script),
        Command::Geometry => {
            print_geometry(&geometry);
            Ok(())
        }
    }
}
