fn main() {
    println!("cargo:rerun-if-changed=../version-info/src/lib.rs");

    #[cfg(target_os = "windows")]
    {
        let descriptor = version_info::current();
        if let Err(issues) = descriptor.validate() {
            for issue in issues {
                println!("cargo:warning=version info: {}", issue);
            }
        }

        let mut res = tauri_winres::WindowsResource::new();

        // String table 040904B0, Translation (1033, 1200)
        res.set_language(descriptor.translation.0);
        for (key, value) in descriptor.string_fields() {
            res.set(key, value);
        }

        res.compile().unwrap();
    }
}
