#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod kernel_main {
    use bootloader::{entry_point, BootInfo};
    use core::panic::PanicInfo;
    use spin::Once;
    use trident::sys::fs::rofs::RoFs;
    use trident::sys::kernel::{self, Kernel};
    use trident::sys::mem::{self, mapper::Mapper, paging};
    use trident::sys::proc::context::Hardware;
    use trident::{hlt_loop, kerror, klog};

    /// Image filesystem yang dikemas build.rs dari `fsdir/`
    static FS_IMAGE: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/fs.img"));
    static FS: Once<RoFs<'static>> = Once::new();

    entry_point!(kernel_main);

    fn kernel_main(boot_info: &'static BootInfo) -> ! {
        trident::init(boot_info);

        let fs = match RoFs::new(FS_IMAGE) {
            Ok(fs) => FS.call_once(|| fs),
            Err(err) => {
                kerror!("boot: filesystem image: {}", err);
                hlt_loop();
            }
        };
        klog!("boot: filesystem has {} entries", fs.entry_count());

        let tables = match unsafe { paging::kernel_tables() } {
            Ok(tables) => tables,
            Err(err) => {
                kerror!("boot: page tables: {}", err);
                hlt_loop();
            }
        };
        let mapper = Mapper::new(
            tables.directory,
            tables.video,
            tables.user_video,
            tables.user_video_phys,
            mem::slot_base(),
        );

        let mut k = Kernel::new(unsafe { Hardware::new() }, mapper, fs);
        k.init();
        kernel::install(k);

        // Interrupt tetap mati sampai iretq ke shell pertama
        x86_64::instructions::interrupts::disable();
        match kernel::with_kernel(|k| k.boot()) {
            Some(Ok(launch)) => unsafe { launch.run::<Hardware>() },
            Some(Err(err)) => kerror!("boot: cannot start shell: {}", err),
            None => kerror!("boot: kernel not installed"),
        }

        // Normalnya tidak pernah sampai sini
        hlt_loop();
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        kerror!("PANIC after {} ms uptime", trident::sys::clk::uptime_ms());
        if let Some(loc) = info.location() {
            kerror!("PANIC at {}:{}:{}: {}", loc.file(), loc.line(), loc.column(), info.message());
        } else {
            kerror!("PANIC: {}", info);
        }
        hlt_loop();
    }
}

/// Build host hanya untuk `cargo test` pada library
#[cfg(not(target_os = "none"))]
fn main() {}
