//! # RingOS Example Firmware
//!
//! Six threads and two periodic tasks exercising every kernel service:
//!
//! | Thread | Behavior |
//! |--------|----------|
//! | `consumer` | Blocks in `fifo_get()` on samples from `sampler` |
//! | `alarm` | Waits on `TICK_EVENT`, signalled by `heartbeat` |
//! | `mutex_a`, `mutex_b` | Take turns in a critical region guarded by `MUTEX` |
//! | `sleeper` | Sleeps 50 ticks per loop |
//! | `cooperative` | Counts and yields with `sleep(0)` |
//!
//! | Periodic task | Period | Behavior |
//! |---------------|--------|----------|
//! | `sampler` | 1 tick | Puts a sample into the FIFO (never blocks) |
//! | `heartbeat` | 100 ticks | Signals `TICK_EVENT` |
//!
//! On non-ARM targets this binary instead runs a short file-system session
//! against simulated flash.

#![cfg_attr(target_arch = "arm", no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

#[cfg(target_arch = "arm")]
mod firmware {
    use core::sync::atomic::{AtomicU32, Ordering};

    use cortex_m_rt::entry;
    use panic_halt as _;

    use ringos::config::FIFO_SIZE;
    use ringos::kernel;
    use ringos::{Fifo, Semaphore};

    const MUTEX: Semaphore = Semaphore::new(0);
    const TICK_EVENT: Semaphore = Semaphore::new(1);
    const SAMPLES_SIZE: Semaphore = Semaphore::new(2);

    static SAMPLES: Fifo<FIFO_SIZE> = Fifo::new(SAMPLES_SIZE);

    static SAMPLE_SEQ: AtomicU32 = AtomicU32::new(0);
    static SAMPLE_SUM: AtomicU32 = AtomicU32::new(0);
    static ALARMS: AtomicU32 = AtomicU32::new(0);
    static SHARED: AtomicU32 = AtomicU32::new(0);
    static NAPS: AtomicU32 = AtomicU32::new(0);
    static YIELDS: AtomicU32 = AtomicU32::new(0);

    // -----------------------------------------------------------------------
    // Periodic tasks (interrupt priority: no blocking, no sleeping)
    // -----------------------------------------------------------------------

    fn sampler() {
        let sample = SAMPLE_SEQ.fetch_add(1, Ordering::Relaxed);
        // A full FIFO just counts the sample as lost
        let _ = kernel::fifo_put(&SAMPLES, sample);
    }

    fn heartbeat() {
        kernel::signal(TICK_EVENT);
    }

    // -----------------------------------------------------------------------
    // Threads
    // -----------------------------------------------------------------------

    extern "C" fn consumer() -> ! {
        loop {
            let sample = kernel::fifo_get(&SAMPLES);
            SAMPLE_SUM.fetch_add(sample, Ordering::Relaxed);
        }
    }

    extern "C" fn alarm() -> ! {
        loop {
            kernel::wait(TICK_EVENT);
            ALARMS.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn critical_region() {
        kernel::wait(MUTEX);
        // Read-modify-write that would tear without the mutex
        let value = SHARED.load(Ordering::Relaxed);
        kernel::suspend();
        SHARED.store(value + 1, Ordering::Relaxed);
        kernel::signal(MUTEX);
    }

    extern "C" fn mutex_a() -> ! {
        loop {
            critical_region();
        }
    }

    extern "C" fn mutex_b() -> ! {
        loop {
            critical_region();
            kernel::sleep(5);
        }
    }

    extern "C" fn sleeper() -> ! {
        loop {
            kernel::sleep(50);
            NAPS.fetch_add(1, Ordering::Relaxed);
        }
    }

    extern "C" fn cooperative() -> ! {
        loop {
            YIELDS.fetch_add(1, Ordering::Relaxed);
            kernel::sleep(0);
        }
    }

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------

    /// Time slice in ticks.
    const TIME_SLICE: u32 = 2;

    #[entry]
    fn main() -> ! {
        let cp = cortex_m::Peripherals::take().unwrap();

        kernel::init();
        kernel::add_threads([consumer, alarm, mutex_a, mutex_b, sleeper, cooperative])
            .expect("threads");
        kernel::add_periodic_task(sampler, 1).expect("sampler");
        kernel::add_periodic_task(heartbeat, 100).expect("heartbeat");
        kernel::init_semaphore(MUTEX, 1);
        kernel::init_semaphore(TICK_EVENT, 0);
        kernel::fifo_init(&SAMPLES);

        let Err(err) = kernel::launch(cp, TIME_SLICE);
        panic!("launch failed: {}", err);
    }
}

#[cfg(not(target_arch = "arm"))]
fn main() {
    use ringos::config::SECTOR_SIZE;
    use ringos::{Disk, FileSystem, SimFlash};

    let mut fs = FileSystem::new(Disk::new(SimFlash::new()));
    if let Err(err) = fs.format() {
        eprintln!("format: {}", err);
        return;
    }

    let log_file = match fs.new_file() {
        Ok(id) => id,
        Err(err) => {
            eprintln!("new file: {}", err);
            return;
        }
    };
    for record in 0..4u8 {
        let sector = [record; SECTOR_SIZE];
        if let Err(err) = fs.append(log_file, &sector) {
            eprintln!("append: {}", err);
            return;
        }
    }
    if let Err(err) = fs.flush() {
        eprintln!("flush: {}", err);
        return;
    }

    // Power cycle: drop the RAM metadata and mount again from flash
    let mut fs = FileSystem::new(fs.into_disk());
    let size = fs.size(log_file).unwrap_or(0);
    println!("file {} holds {} sectors after remount", log_file, size);

    let mut sector = [0u8; SECTOR_SIZE];
    for location in 0..size as u8 {
        match fs.read(log_file, location, &mut sector) {
            Ok(()) => println!("  sector {}: first byte {:#04x}", location, sector[0]),
            Err(err) => println!("  sector {}: {}", location, err),
        }
    }
}
