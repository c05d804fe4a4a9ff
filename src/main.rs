use yetty::config::Config;
use yetty::host::Host;

fn main() {
    let config = Config::load();
    let log_dir = yetty::config::config_dir();
    let _guard = yetty::init_logging(&log_dir);

    let event_loop = match winit::event_loop::EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            tracing::error!(target: "yetty.startup", error = %e, "failed to create event loop");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(winit::event_loop::ControlFlow::Wait);

    let mut host = Host::new(config);
    if let Err(e) = event_loop.run_app(&mut host) {
        tracing::error!(target: "yetty.startup", error = %e, "event loop exited with error");
        std::process::exit(1);
    }
}
