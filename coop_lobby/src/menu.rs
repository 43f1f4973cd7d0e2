use serde::Serialize;

/// Content rows per page. Two control rows ("Page up"/"Page down")
/// follow, so every submenu render ships nine slots.
pub const PAGE_SIZE: usize = 7;
pub const MENU_SLOTS: usize = PAGE_SIZE + 2;

/// Selection index the engine reports for "back to the parent menu".
pub const BACK_ITEM: usize = 0;
pub const PAGE_UP_ITEM: usize = MENU_SLOTS - 1;
pub const PAGE_DOWN_ITEM: usize = MENU_SLOTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MenuId {
    HostMain,
    ClientMain,
    OpenMission,
    CloseMission,
    StartMission,
    SelectMission,
    SelectAircraft,
    Players,
}

impl MenuId {
    pub fn is_submenu(self) -> bool {
        !matches!(self, MenuId::HostMain | MenuId::ClientMain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuEntry {
    pub label: String,
    pub has_sub: bool,
}

impl MenuEntry {
    pub fn new(label: impl Into<String>) -> Self {
        MenuEntry {
            label: label.into(),
            has_sub: true,
        }
    }

    pub fn blank() -> Self {
        MenuEntry::new("")
    }
}

/// What a selection index means on a paginated submenu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Back,
    PageUp,
    PageDown,
    /// Index into the backing list; may be stale and past its end.
    Pick(usize),
    Ignore,
}

/// Map a raw selection index to an action. `offset` is the clamped
/// page offset the menu was last rendered with.
pub fn classify_selection(item: usize, offset: usize) -> MenuAction {
    match item {
        BACK_ITEM => MenuAction::Back,
        PAGE_UP_ITEM => MenuAction::PageUp,
        PAGE_DOWN_ITEM => MenuAction::PageDown,
        slot if (1..=PAGE_SIZE).contains(&slot) => MenuAction::Pick(offset * PAGE_SIZE + slot - 1),
        _ => MenuAction::Ignore,
    }
}

/// Wrap an out-of-range page offset: going below page zero lands on
/// the last page, paging past the end lands back on page zero.
pub fn clamp_offset(offset: i64, count: usize) -> usize {
    if offset < 0 {
        count / PAGE_SIZE
    } else if offset as usize * PAGE_SIZE > count {
        0
    } else {
        offset as usize
    }
}

/// Render one page of a backing list into the fixed nine-slot layout.
/// Slots past the end of the list stay blank but selectable so slot
/// indices never shift.
pub fn paged_entries(items: &[String], offset: usize) -> Vec<MenuEntry> {
    let mut entries = Vec::with_capacity(MENU_SLOTS);
    for slot in 0..PAGE_SIZE {
        match items.get(offset * PAGE_SIZE + slot) {
            Some(label) => entries.push(MenuEntry::new(label.clone())),
            None => entries.push(MenuEntry::blank()),
        }
    }
    entries.push(MenuEntry::new("Page up"));
    entries.push(MenuEntry::new("Page down"));
    entries
}
