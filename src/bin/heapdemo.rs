// Quick demo of the debug heap failure modes. Cases 1–3 are *supposed* to
// kill the process; run each under a debugger to see where the fault lands.

use guardheap::DebugHeap;

fn usage() -> ! {
    eprintln!("Usage: heapdemo <testcase>");
    eprintln!();
    eprintln!("Test cases:");
    eprintln!("0: setup+teardown");
    eprintln!("1: array overrun (should crash)");
    eprintln!("2: double free (should assert)");
    eprintln!("3: use after free (should crash)");
    std::process::exit(1);
}

fn main() {
    let Some(case) = std::env::args().nth(1) else {
        usage();
    };

    let heap = DebugHeap::new(2 * 1024 * 1024).expect("failed to create debug heap");

    match case.as_str() {
        "0" => {
            let ptr = heap.allocate(128, 4).expect("allocation failed");
            // Safety: in-bounds write to a live allocation.
            unsafe {
                ptr.as_ptr().add(127).write(b'a');
                heap.free(ptr);
            }
            println!("setup+teardown OK");
        }

        "1" => {
            let ptr = heap.allocate(128, 4).expect("allocation failed");
            // Safety: deliberately out of bounds, lands on the guard page.
            unsafe {
                ptr.as_ptr().add(128).write(b'a'); // should crash here
            }
        }

        "2" => {
            let ptr = heap.allocate(128, 4).expect("allocation failed");
            // Safety: deliberate double free.
            unsafe {
                heap.free(ptr);
                heap.free(ptr); // should assert here
            }
        }

        "3" => {
            let ptr = heap.allocate(128, 4).expect("allocation failed");
            // Safety: deliberate use after free; the page is decommitted.
            unsafe {
                heap.free(ptr);
                ptr.as_ptr().write(b'a'); // should crash here
            }
        }

        _ => {
            eprintln!("Unsupported test case");
        }
    }
}
