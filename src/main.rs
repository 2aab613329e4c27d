use cfb_rs::CfbFile;

#[tokio::main]
async fn main() {
    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: cfb-rs <compound-file>");
            std::process::exit(2);
        }
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(error) => {
            eprintln!("cannot open {}: {}", path, error);
            std::process::exit(1);
        }
    };

    let cfb_file = match CfbFile::parse(file).await {
        Ok(cfb_file) => cfb_file,
        Err(error) => {
            eprintln!(
                "error parsing compound file, invalid or not a CFB file.  error details: {}",
                error
            );
            std::process::exit(1);
        }
    };

    // println!("parsed file: {:#?}", cfb_file);

    for entry_path in cfb_file.list_entries() {
        match cfb_file.get_entry(&entry_path) {
            Some(entry) if entry.is_directory() => {
                println!("{}  <storage>", entry_path);
            }
            Some(entry) => {
                println!("{}  {} bytes", entry_path, entry.stream_size());
            }
            None => {}
        }
    }
}
