use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use save_queue::save::{
    Binary, BinarySave, ByteReader, ByteWriter, SaveError, StorageTarget, TextField,
    TextSaveCollection,
};
use save_queue::{SaveConfig, SaveManager};

// Roughly 60 ticks per second
const FRAME: Duration = Duration::from_millis(16);

/// Game save: the player's progress
#[derive(Debug, Clone, PartialEq)]
struct Player {
    level: i32,
    hp: f32,
}

impl Default for Player {
    fn default() -> Self {
        Self { level: 1, hp: 1.0 }
    }
}

impl BinarySave for Player {
    fn reset(&mut self) {
        *self = Player::default();
    }

    fn read(&mut self, reader: &mut ByteReader<'_>) -> Result<(), SaveError> {
        self.level = reader.read_i32()?;
        self.hp = reader.read_f32()?;
        Ok(())
    }

    fn write(&self, writer: &mut ByteWriter) -> Result<(), SaveError> {
        writer.write_i32(self.level);
        writer.write_f32(self.hp);
        Ok(())
    }
}

/// Ticks the manager like a frame loop until it runs dry
fn run_frames(manager: &mut SaveManager) {
    let mut frames = 0u32;
    while manager.has_pending_tasks() {
        manager.update();
        frames += 1;
        std::thread::sleep(FRAME);
    }
    log::debug!("queue drained after {} frame(s)", frames);
}

fn main() -> Result<(), String> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SaveConfig::from_json_file(&path)
            .map_err(|e| format!("Failed to read config {}: {}", path, e))?,
        None => SaveConfig::default(),
    };
    log::info!(
        "Saving under {} using {:?}",
        config.resolve_save_dir().display(),
        config.strategy
    );

    let mut manager = SaveManager::from_config(&config)
        .map_err(|e| format!("Failed to create save manager: {}", e))?;
    log::info!("Save manager running on {}", manager.executor_name());
    manager.on_task_finished(|task| match &task.failure {
        None => println!("✓ {} {}", task.kind, task.target.name()),
        Some(e) => println!("✗ {} {}: {}", task.kind, task.target.name(), e),
    });

    let game_target: Arc<dyn StorageTarget> = Arc::new(
        config
            .file_target("GameSave.bin")
            .map_err(|e| e.to_string())?,
    );
    let settings_target: Arc<dyn StorageTarget> = Arc::new(
        config
            .file_target("Settings.txt")
            .map_err(|e| e.to_string())?,
    );

    let player = Rc::new(RefCell::new(Binary(Player::default())));

    let quality = Rc::new(RefCell::new(0i32));
    let volume = Rc::new(RefCell::new(1.0f32));
    let settings = Rc::new(RefCell::new(
        TextSaveCollection::new()
            .with("Quality Level", TextField::parsed(Rc::clone(&quality), 0))
            .with("Audio Volume", TextField::parsed(Rc::clone(&volume), 1.0)),
    ));

    // Startup: load whatever is there (missing files just reset to defaults)
    manager.enqueue_load(player.clone(), Arc::clone(&game_target));
    manager.enqueue_load(settings.clone(), Arc::clone(&settings_target));
    run_frames(&mut manager);

    println!(
        "Loaded: level {} hp {:.2}, quality {}, volume {:.2}",
        player.borrow().level,
        player.borrow().hp,
        quality.borrow(),
        volume.borrow()
    );

    // Play a little, then save both
    {
        let mut player = player.borrow_mut();
        player.level += 1;
        player.hp = (player.hp * 0.9).max(0.1);
    }
    let next_quality = (*quality.borrow() + 1) % 4;
    *quality.borrow_mut() = next_quality;
    *volume.borrow_mut() = 0.8;

    manager.enqueue_save(player.clone(), game_target);
    manager.enqueue_save(settings.clone(), settings_target);
    run_frames(&mut manager);

    println!(
        "Saved: level {} hp {:.2}, quality {}, volume {:.2}",
        player.borrow().level,
        player.borrow().hp,
        quality.borrow(),
        volume.borrow()
    );

    manager.shutdown();
    Ok(())
}
