mod gui;

use std::error::Error;

use clap::Parser;
use log::info;
use pozyx_ranging::{
    args::MonitorArgs,
    gui::{
        list_selector::{csv_files, list_selector},
        plot_view::{App, Message},
    },
    trace::Trace,
};

use gui::engage_gui;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = MonitorArgs::parse();

    let mut app = App::new(args.cutoff.map(|cutoff| (args.order, cutoff)));

    let mut files = args.files.into_iter();
    let data_file = match files.next() {
        Some(file) => Some(file),
        None => list_selector("Select Trace", csv_files(&args.data_dir)?)?,
    };
    let Some(data_file) = data_file else {
        info!("No trace selected");
        return Ok(());
    };
    app.update(Message::FileSelected(data_file));
    if let Some(truth) = files.next() {
        app.load_ground_truth(Trace::from_path(truth)?);
    }

    engage_gui(app, &args.data_dir)
}
