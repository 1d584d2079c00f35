use std::env;

fn main() {
    // Pick the default log filter for the build profile; DemoConfig can still override it
    let profile = env::var("PROFILE").unwrap_or_else(|_| "debug".to_string());

    let default_filter = match profile.as_str() {
        "release" => "error,wgpu=error",
        "profiling" => "warn,wgpu=error",
        _ => "info,wgpu=error,naga=warn,terrain_placement_demo=debug",
    };

    println!("cargo:rustc-env=TERRAIN_DEMO_DEFAULT_LOG={default_filter}");
    println!("cargo:rerun-if-env-changed=PROFILE");
}
