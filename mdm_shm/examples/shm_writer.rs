//! Producer example: pushes a moving bump into one DM channel
//!
//! Run the server first, then:
//!   cargo run -p mdm_shm --example shm_writer -- dm1disp00

use mdm::consts::{DM_GRID_SIDE, DM_VIRTUAL_ACTUATORS};
use mdm::shm::consts::DEFAULT_SHM_DIR;
use mdm_shm::{ImageWriter, ShmResult};
use std::path::Path;
use std::time::Duration;

fn main() -> ShmResult<()> {
    let name = std::env::args().nth(1).unwrap_or_else(|| "dm1disp00".to_string());

    println!("Attaching to channel '{name}' in {DEFAULT_SHM_DIR}...");
    let writer = match ImageWriter::attach(Path::new(DEFAULT_SHM_DIR), &name) {
        Ok(w) => w,
        Err(e) => {
            println!("Failed to attach: {e}");
            println!("Make sure the DM server is running with enough channels.");
            return Err(e);
        }
    };

    let mut frame = vec![0.0; DM_VIRTUAL_ACTUATORS];
    for step in 0..DM_VIRTUAL_ACTUATORS {
        frame.fill(0.0);
        frame[step] = 0.5;
        let counter = writer.publish(&frame)?;
        println!(
            "bump at ({}, {}), counter {}",
            step / DM_GRID_SIDE,
            step % DM_GRID_SIDE,
            counter
        );
        std::thread::sleep(Duration::from_millis(50));
    }

    writer.zero()?;
    println!("Channel '{name}' zeroed");
    Ok(())
}
