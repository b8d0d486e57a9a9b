use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{ChatCommand, ChatEvent, Room, Session};
use crate::network::ChannelState;
use crate::room::HistoryStatus;

use super::components::{
    chat_area, input_bar,
    sidebar::{self, SidebarActions},
};
use super::state::AppState;

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<ChatCommand>,
    event_receiver: mpsc::Receiver<ChatEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        session: Session,
        command_sender: mpsc::Sender<ChatCommand>,
        event_receiver: mpsc::Receiver<ChatEvent>,
    ) -> Self {
        let app = Self {
            state: AppState::new(session),
            command_sender,
            event_receiver,
        };
        app.send_command(ChatCommand::RefreshRooms);
        app
    }

    fn handle_network_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.handle_event(event);
        }
    }

    fn send_command(&self, command: ChatCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to network: {err}");
        }
    }

    fn enter_room(&mut self, room: Room) {
        if self.state.enter_room(room.clone()) {
            self.send_command(ChatCommand::EnterRoom(room));
        }
    }

    fn leave_room(&mut self) {
        if self.state.leave_room() {
            self.send_command(ChatCommand::LeaveRoom);
        }
    }

    fn submit_input(&mut self) {
        if let Some(outbound) = self.state.take_input() {
            self.send_command(ChatCommand::SendMessage(outbound));
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_network_events();

        egui::SidePanel::left("room_sidebar")
            .resizable(true)
            .default_width(200.0)
            .show(ctx, |ui| {
                let actions: SidebarActions = sidebar::render(ui, &self.state);
                if actions.refresh {
                    self.send_command(ChatCommand::RefreshRooms);
                }
                if let Some(room) = actions.enter {
                    self.enter_room(room);
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(room) = self.state.room.as_ref() else {
                ui.heading("Room Chat");
                ui.separator();
                ui.label("Pick a room on the left to start chatting");
                return;
            };

            let mut leave = false;
            ui.horizontal(|ui| {
                ui.heading(room.room().label());
                let state = room.channel_state();
                let color = match state {
                    ChannelState::Connected => egui::Color32::GREEN,
                    ChannelState::Connecting | ChannelState::Reconnecting { .. } => {
                        egui::Color32::YELLOW
                    }
                    ChannelState::Disconnected => egui::Color32::RED,
                };
                ui.colored_label(color, "●");
                ui.label(egui::RichText::new(state.to_string()).weak());
                if ui.small_button("Leave").clicked() {
                    leave = true;
                }
            });
            if leave {
                self.leave_room();
                return;
            }

            match room.history() {
                HistoryStatus::Loading => {
                    ui.label(egui::RichText::new("Loading history...").weak());
                }
                HistoryStatus::Failed(reason) => {
                    ui.colored_label(
                        egui::Color32::RED,
                        format!("Could not load history: {reason}"),
                    );
                }
                HistoryStatus::Loaded => {}
            }
            if let Some(err) = room.last_error() {
                ui.colored_label(egui::Color32::RED, err);
            }
            ui.separator();

            let can_send = room.channel_state() == ChannelState::Connected;
            egui::TopBottomPanel::bottom("input_bar").show_inside(ui, |ui| {
                if input_bar::render(ui, &mut self.state.input_text, can_send) {
                    self.submit_input();
                }
            });

            if let Some(room) = self.state.room.as_ref() {
                chat_area::render(ui, room.messages());
            }
        });

        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
