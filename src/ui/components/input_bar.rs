use eframe::egui;

/// Returns `true` when the user asked to send what is in `input_text`.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, can_send: bool) -> bool {
    let mut send = false;
    ui.horizontal(|ui| {
        let response = ui.add(
            egui::TextEdit::singleline(input_text).hint_text("Type a message..."),
        );
        if ui.add_enabled(can_send, egui::Button::new(">")).clicked() {
            send = true;
        }

        if can_send && response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
            response.request_focus();
        }
    });

    send && !input_text.trim().is_empty()
}
