use std::{sync::Arc, sync::Mutex};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use winit::event_loop::EventLoopProxy;
#[cfg(target_arch = "wasm32")]
use once_cell::sync::OnceCell;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::future_to_promise;
#[cfg(target_arch = "wasm32")]
use js_sys::Promise;

pub mod camera;
pub mod config;
pub mod error;
pub mod mesh;
pub mod models;
pub mod morph;
pub mod normalizer;
pub mod particles;
pub mod scene;
pub mod simulation;
pub mod transition;
mod app_state;
mod ui_events;

use app_state::State;
use config::MorphConfig;
use ui_events::UserCommand;

#[cfg(target_arch = "wasm32")]
static WASM_API_INSTANCE: OnceCell<WasmApi> = OnceCell::new();

#[cfg(target_arch = "wasm32")]
static WASM_READY_FLUME_CHANNEL: OnceCell<(flume::Sender<()>, flume::Receiver<()>)> = OnceCell::new();


struct App {
    window: Option<Arc<Window>>,
    state: Arc<Mutex<Option<State>>>, // Filled once the models are loaded
    config: MorphConfig,
    #[cfg(target_arch = "wasm32")]
    proxy: Option<EventLoopProxy<UserCommand>>,
}

impl App {
    fn new(config: MorphConfig, #[cfg(target_arch = "wasm32")] event_loop: &EventLoop<UserCommand>) -> Self {
        #[cfg(target_arch = "wasm32")]
        let app_proxy = event_loop.create_proxy();

        #[cfg(target_arch = "wasm32")]
        {
            let wasm_api_instance = WasmApi { proxy: app_proxy.clone() };
            if WASM_API_INSTANCE.set(wasm_api_instance).is_err() {
                log::warn!("WASM_API_INSTANCE was already set. This should only happen once.");
            }
        }

        Self {
            window: None,
            state: Arc::new(Mutex::new(None)),
            config,
            #[cfg(target_arch = "wasm32")]
            proxy: Some(app_proxy),
        }
    }
}

impl ApplicationHandler<UserCommand> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes()
            .with_title("Morphfield");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            match pollster::block_on(State::new(window.clone(), self.config.clone())) {
                Ok(mut state) => {
                    let current_size = window.inner_size();
                    state.resize(current_size.width, current_size.height, window.scale_factor());
                    if let Ok(mut guard) = self.state.lock() {
                        guard.replace(state);
                    }
                    window.request_redraw();
                }
                Err(e) => {
                    // Partial populations are never rendered
                    log::error!("Initialization failed: {:#}", e);
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let state_arc_for_spawn = self.state.clone();
            let window_for_state_new = window.clone();
            let config = self.config.clone();
            let proxy_for_init_notification = self.proxy.as_ref().expect("App proxy not set").clone();

            wasm_bindgen_futures::spawn_local(async move {
                match State::new(window_for_state_new.clone(), config).await {
                    Ok(mut state_instance) => {
                        log::info!("WASM State created in async task.");
                        let initial_size = window_for_state_new.inner_size();
                        state_instance.resize(initial_size.width, initial_size.height, window_for_state_new.scale_factor());

                        if let Ok(mut app_state_guard) = state_arc_for_spawn.lock() {
                            app_state_guard.replace(state_instance);
                        }
                        log::info!("WASM State assigned to App. Sending initialization notification.");
                        if proxy_for_init_notification.send_event(UserCommand::StateInitialized).is_err() {
                            log::error!("Failed to send StateInitialized event.");
                        }
                    },
                    Err(e) => log::error!("Failed to create State in WASM: {:#}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserCommand) {
        match event {
            UserCommand::StateInitialized => {
                log::info!("WASM State initialized and ready.");
                // Signal to the promise resolver
                #[cfg(target_arch = "wasm32")]
                if let Some((sender, _)) = WASM_READY_FLUME_CHANNEL.get() {
                    if let Err(e) = sender.send(()) {
                        log::error!("Failed to send WASM ready signal: {:?}", e);
                    }
                }
                if let Some(w_handle) = self.window.as_ref() {
                    w_handle.request_redraw();
                }
            }
            _ => {
                let Ok(mut guard) = self.state.lock() else {
                    log::error!("State lock poisoned, dropping command {:?}", event);
                    return;
                };
                if let Some(state) = guard.as_mut() {
                    state.process_command(event);
                    if let Some(w_handle) = self.window.as_ref() {
                        w_handle.request_redraw();
                    }
                } else {
                    log::warn!("Received a command before state was initialized (via proxy). Ignoring: {:?}", event);
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Ok(mut guard) = self.state.lock() else {
            log::error!("State lock poisoned, ignoring window event.");
            return;
        };
        let Some(state) = guard.as_mut() else {
            log::warn!("Window event received before State was initialized, ignoring.");
            return;
        };
        let Some(window_handle) = self.window.as_ref() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height, window_handle.scale_factor());
                window_handle.request_redraw();
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                let size = window_handle.inner_size();
                state.resize(size.width, size.height, scale_factor);
            }
            WindowEvent::RedrawRequested => {
                match state.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        state.resize(state.config.width, state.config.height, window_handle.scale_factor())
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                    Err(e) => log::error!("{:?}", e),
                }
                // The morph is driven by the frame clock, so keep frames coming.
                window_handle.request_redraw();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: key_state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if key_state.is_pressed() && !repeat {
                    let command = match code {
                        KeyCode::Digit1 => Some(UserCommand::SelectModel(0)),
                        KeyCode::Digit2 => Some(UserCommand::SelectModel(1)),
                        KeyCode::Digit3 => Some(UserCommand::SelectModel(2)),
                        KeyCode::Digit4 => Some(UserCommand::SelectModel(3)),
                        KeyCode::Digit5 => Some(UserCommand::SelectModel(4)),
                        KeyCode::Digit6 => Some(UserCommand::SelectModel(5)),
                        KeyCode::Digit7 => Some(UserCommand::SelectModel(6)),
                        KeyCode::Digit8 => Some(UserCommand::SelectModel(7)),
                        KeyCode::Digit9 => Some(UserCommand::SelectModel(8)),
                        KeyCode::Space => Some(UserCommand::NextModel),
                        KeyCode::Escape => {
                            event_loop.exit();
                            None
                        }
                        _ => None,
                    };
                    if let Some(command) = command {
                        state.process_command(command);
                    }
                }
            },
            _ => {}
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    cfg_if::cfg_if! {
        if #[cfg(target_arch = "wasm32")] {
            console_error_panic_hook::set_once();
            console_log::init_with_level(log::Level::Info)
                .map_err(|e| anyhow::anyhow!("failed to initialize console logger: {e}"))?;
            log::info!("Starting Morphfield.");
            let (sender, receiver) = flume::unbounded();
            if WASM_READY_FLUME_CHANNEL.set((sender, receiver)).is_err() {
                anyhow::bail!("WASM ready channel was already initialized");
            }
            log::info!("WASM ready channel created and stored.");
        } else {
            env_logger::init();
        }
    }

    let config = MorphConfig::from_env()?;

    let event_loop = EventLoop::with_user_event().build()?;
    let mut app = App::new(
        config,
        #[cfg(target_arch = "wasm32")]
        &event_loop,
    );
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    run().map_err(|e| JsValue::from_str(&format!("{e:#}")))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
#[derive(Clone, Debug)]
pub struct WasmApi {
    proxy: EventLoopProxy<UserCommand>,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl WasmApi {
    /// Starts a morph to the model at `index`. The returned promise resolves
    /// once the morph is accepted and rejects with the reason otherwise, e.g.
    /// while another morph is still running.
    #[wasm_bindgen(js_name = selectModel)]
    pub fn select_model(&self, index: usize) -> Result<Promise, JsValue> {
        log::info!("Received selectModel({}) from JS.", index);
        let (reply, outcome) = flume::bounded(1);
        if self.proxy.send_event(UserCommand::SelectModelWithReply(index, reply)).is_err() {
            return Err(JsValue::from_str("Failed to send command to event loop."));
        }

        Ok(future_to_promise(async move {
            match outcome.recv_async().await {
                Ok(Ok(())) => Ok(JsValue::NULL),
                Ok(Err(e)) => Err(JsValue::from_str(&e.to_string())),
                Err(_) => Err(JsValue::from_str("Model selection dropped before the state was ready.")),
            }
        }))
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmApi)]
pub fn get_wasm_api() -> Result<WasmApi, JsValue> {
    WASM_API_INSTANCE.get()
        .cloned()
        .ok_or_else(|| JsValue::from_str("WasmApi is not initialized. Call run_web() first."))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmReadyPromise)]
pub fn get_wasm_ready_promise() -> Result<Promise, JsValue> {
    let (_, receiver) = WASM_READY_FLUME_CHANNEL.get()
        .ok_or_else(|| JsValue::from_str("WASM ready channel not initialized. Call run_web() first."))?;

    let ready_promise = future_to_promise(async move {
        receiver.recv_async().await
            .map_err(|e| JsValue::from_str(&format!("ready channel closed: {e}")))?;
        Ok(JsValue::NULL)
    });

    Ok(ready_promise)
}
