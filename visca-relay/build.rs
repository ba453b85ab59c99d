fn main() {
    println!("cargo:rerun-if-changed=../version-info/src/lib.rs");

    #[cfg(target_os = "windows")]
    {
        let descriptor = version_info::current();
        let mut res = tauri_winres::WindowsResource::new();

        res.set_language(descriptor.translation.0);
        for (key, value) in descriptor.string_fields() {
            res.set(key, value);
        }
        // Same product, its own executable
        res.set("FileDescription", "VISCA Relay");
        res.set("InternalName", "visca-relay");
        res.set("OriginalFilename", "visca-relay.exe");

        res.compile().unwrap();
    }
}
