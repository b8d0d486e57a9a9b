use eframe::egui;

use crate::common::ChatMessage;

pub fn render(ui: &mut egui::Ui, messages: &[ChatMessage]) {
    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            if messages.is_empty() {
                ui.label(egui::RichText::new("No messages yet").weak());
                return;
            }

            for message in messages {
                render_message(ui, message);
            }
        });
}

fn render_message(ui: &mut egui::Ui, message: &ChatMessage) {
    // Tin của mình căn phải, tin người khác căn trái
    let layout = if message.is_own {
        egui::Layout::right_to_left(egui::Align::TOP)
    } else {
        egui::Layout::left_to_right(egui::Align::TOP)
    };

    ui.with_layout(layout, |ui| {
        let time = message.sent_at.format("%H:%M").to_string();
        ui.label(egui::RichText::new(time).weak().small());

        let color = if message.is_own {
            egui::Color32::LIGHT_BLUE
        } else {
            egui::Color32::WHITE
        };
        ui.colored_label(color, message.body.as_str());

        if !message.is_own {
            ui.label(egui::RichText::new(&message.author).strong());
        }
        if message.is_pending() {
            ui.label(egui::RichText::new("(sending)").weak().italics());
        }
    });
}
