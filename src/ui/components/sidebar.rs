use crate::common::Room;
use crate::ui::state::AppState;
use eframe::egui;

#[derive(Default)]
pub struct SidebarActions {
    pub refresh: bool,
    pub enter: Option<Room>,
}

pub fn render(ui: &mut egui::Ui, state: &AppState) -> SidebarActions {
    let mut actions = SidebarActions::default();

    ui.horizontal(|ui| {
        ui.heading("Rooms");
        if ui.small_button("⟳").clicked() {
            actions.refresh = true;
        }
    });
    ui.separator();

    if let Some(err) = &state.rooms_error {
        ui.colored_label(egui::Color32::RED, format!("Failed to load rooms: {err}"));
    }

    if state.rooms.is_empty() {
        ui.label("No rooms yet");
        return actions;
    }

    for room in &state.rooms {
        let selected = state.is_active(room);
        if ui.selectable_label(selected, room.label()).clicked() && !selected {
            actions.enter = Some(room.clone());
        }
    }

    ui.separator();
    ui.label(egui::RichText::new(format!("Signed in as {}", state.session.username)).weak());

    actions
}
