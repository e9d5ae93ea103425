// build.rs

fn main() {
    // Only the Linux backends link against Xlib. The native window backend
    // used elsewhere loads its own platform libraries.
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "linux" {
        return;
    }

    // --- Link against X11 and the MIT-SHM extension library ---
    // Try pkg-config first; if any probe fails fall back to plain linker flags
    // and hope the libraries live in a standard search path.
    let libraries = ["x11", "xext"];

    let mut pkg_config_success = true;

    for lib in &libraries {
        if pkg_config::probe_library(lib).is_err() {
            eprintln!(
                "pkg-config failed for library '{}'. Falling back to manual linking.",
                lib
            );
            pkg_config_success = false;
            break;
        }
    }

    if !pkg_config_success {
        println!("cargo:rustc-link-lib=X11");
        println!("cargo:rustc-link-lib=Xext"); // XShm* live here
        println!("cargo:rustc-link-search=/usr/lib");
        eprintln!(
            "Manual linking flags applied. Ensure X11 and Xext development libraries are installed."
        );
    } else {
        eprintln!("pkg-config successfully found libraries. Linking configured automatically.");
    }
}
