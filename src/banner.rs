// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    let banner = r#"
  _____                        _____            _             _
 | ____|_  ____ _ _ __ ___    | ____|_   ____ _| |_   _  __ _| |_ ___  _ __
 |  _| \ \/ / _` | '_ ` _ \   |  _| \ \ / / _` | | | | |/ _` | __/ _ \| '__|
 | |___ >  < (_| | | | | | |  | |___ \ V / (_| | | |_| | (_| | || (_) | |
 |_____/_/\_\__,_|_| |_| |_|  |_____| \_/ \__,_|_|\__,_|\__,_|\__\___/|_|

    Answer Sheet Evaluation Client
"#;
    println!("{}", banner);
}
