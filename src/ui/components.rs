use serenity::builder::{
    CreateActionRow, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption,
};

use crate::audio::context::Picker;

/// Crea el menú de selección de la búsqueda
pub fn create_picker_menu(picker: &Picker) -> CreateSelectMenu {
    let options = picker
        .options
        .iter()
        .map(|option| CreateSelectMenuOption::new(&option.label, &option.value))
        .collect();

    CreateSelectMenu::new(&picker.custom_id, CreateSelectMenuKind::String { options })
        .placeholder(&picker.placeholder)
        .min_values(1)
        .max_values(1)
}

pub fn create_picker_row(picker: &Picker) -> CreateActionRow {
    CreateActionRow::SelectMenu(create_picker_menu(picker))
}
