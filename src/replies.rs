//! User-facing message text. Every message is sent with HTML parse mode, so
//! anything the user typed goes through [`escape_html`] first.

use crate::logstore::DaySummary;
use crate::tasks::Task;
use chrono::NaiveDate;

pub const START_GREETING: &str = "<b>Привет! 🤍</b>\n\
\n\
Здесь ты можешь быть настоящим.\n\
Запиши то, что хочешь сохранить — даже если это просто мысль.\n\
\n\
<b>\"Будь собой. Все остальные роли уже заняты.\"\n\
— Оскар Уайльд</b>";

pub const REMINDERS_OFF: &str = "🔕 Напоминания о воде отключены. Забота о себе — в твоих руках!";
pub const REMINDERS_ALREADY_OFF: &str = "❕ У тебя и так не было активных напоминаний.";

pub const ASK_TASK: &str = "❔ Что добавить в задачи? Напиши текст задачи.";
pub const TASK_EMPTY: &str = "❕ Задача не может быть пустой! Попробуй ещё раз.";
pub const NO_TASKS: &str = "❕ У тебя пока нет задач. Добавь через /addtask";
pub const NO_TASKS_TO_MARK: &str = "❕ Нет задач для отметки. Добавь через /addtask";
pub const DONETASK_USAGE: &str = "<b>❕ Используй:</b> /donetask номер задачи";
pub const BAD_TASK_NUMBER: &str = "❕ Неверный номер задачи.";

pub const CANCELLED: &str = "❕ Действие отменено. Можешь ввести новую команду!";

pub const ASK_MEAL: &str = "Что ты ел? 🍽️\n\
Напиши, например: завтрак - овсянка и банан.\n\
\n\
<b>Пусть каждый приём пищи станет маленьким ритуалом заботы о себе!</b>";
pub const MEAL_FORMAT_ERROR: &str = "❕ Пожалуйста, используй формат: завтрак - овсянка и банан.\n\
\n\
<b>Это поможет мне лучше понимать твои привычки!</b>";

pub const ASK_WATER: &str = "Сколько воды ты выпил? 💧\n\
Напиши количество в мл, например: 250\n\
\n\
<b>Вода — твой источник энергии!</b>";
pub const WATER_FORMAT_ERROR: &str = "❕ Пожалуйста, введи число (например, 250).\n\
\n\
<b>Я помогу тебе отслеживать водный баланс!</b>";

pub const ASK_REFLECTION: &str = "💭 Как прошёл твой день? Что ты чувствовал?\n\
\n\
<b>Поделись любыми мыслями или эмоциями. Я здесь, чтобы выслушать.</b>";

pub const SUMMARY_EMPTY: &str = "➖ Пока нет записей. Всё пусто!\n\
\n\
<b>Начни с маленького шага — запиши что-нибудь!</b>";
pub const SUMMARYDATE_USAGE: &str = "Укажи дату в формате ДД.ММ.ГГГГ.\n\
\n\
<b>Например: /summarydate 25.05.2025</b>";
pub const SUMMARYDATE_FORMAT_ERROR: &str = "❕ Неверный формат даты. Используй ДД.ММ.ГГГГ\n\
\n\
<b>Например: 25.05.2025</b>";

pub const CLEARED: &str = "❕ Все твои записи за сегодня удалены.\n\
\n\
<b>Новый день — новые возможности!</b>";

pub const STORAGE_ERROR: &str = "❕ Не удалось сохранить данные. Попробуй позже.";

pub const WATER_REMINDER: &str = "🔔 Не забудь выпить воды!";

pub const MORNING_QUOTES: &[&str] = &[
    "Каждое утро — это новый шанс начать сначала.",
    "Улыбнись новому дню и он улыбнётся тебе в ответ!",
    "Сегодня — лучший день, чтобы стать лучше, чем вчера.",
    "Пусть этот день принесёт тебе радость и вдохновение!",
    "Верь в себя — и всё получится!",
    "Сделай сегодня то, о чём завтра будешь гордиться.",
    "Пусть твои мысли будут светлыми, а сердце — спокойным.",
    "Каждый день — это маленькая жизнь.",
    "Начни утро с благодарности и день сложится удачно.",
    "Ты способен(на) на большее, чем думаешь!",
];

/// Escape text for Telegram HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn task_added(name: &str) -> String {
    format!("➕ Задача добавлена: {}", escape_html(name))
}

pub fn task_done(name: &str) -> String {
    format!("❕ Задача '{}' отмечена как выполненная сегодня!", escape_html(name))
}

/// Numbered checklist with a done glyph for `date`
pub fn render_tasks(tasks: &[Task], date: NaiveDate) -> String {
    if tasks.is_empty() {
        return NO_TASKS.to_string();
    }

    let mut msg = String::from("<b>Твои задачи:</b>\n");
    for (i, task) in tasks.iter().enumerate() {
        let status = if task.is_done_on(date) { "✅" } else { "⬜" };
        msg.push_str(&format!("{}. {} {}\n", i + 1, escape_html(&task.name), status));
    }
    msg.push_str("\n<b>❕ Чтобы отметить задачу выполненной: /donetask номер</b>");
    msg
}

pub fn meal_saved(advice: &str) -> String {
    format!("➕ Приём пищи записан!\n\n<b>Совет: {}</b>", escape_html(advice))
}

pub fn water_saved(amount_ml: i64) -> String {
    format!("➕ Записано: {} мл воды\n\n<b>Ты заботишься о себе!</b>", amount_ml)
}

pub fn reflection_saved(feedback: &str) -> String {
    format!(
        "➕ Рефлексия записана!\n\nGPT: {}\n\n<b>Спасибо, что доверяешь свои мысли!</b>",
        escape_html(feedback)
    )
}

/// Body of a day summary; empty string when nothing was logged
pub fn render_summary(summary: &DaySummary) -> String {
    let mut sections = Vec::new();

    if !summary.food.is_empty() {
        let mut food = String::from("🍽️ <b>Еда:</b>");
        for meal in &summary.food {
            food.push_str(&format!(
                "\n• {}: {}",
                escape_html(&meal.label),
                escape_html(&meal.description)
            ));
        }
        sections.push(food);
    }

    if summary.water_entries > 0 {
        sections.push(format!("💧 <b>Вода:</b> {} мл", summary.water_ml));
    }

    if !summary.reflections.is_empty() {
        let mut reflections = String::from("💭 <b>Рефлексия:</b>");
        for text in &summary.reflections {
            reflections.push_str(&format!("\n• {}", escape_html(text)));
        }
        sections.push(reflections);
    }

    sections.join("\n\n")
}

pub fn summary_today(summary: &DaySummary) -> String {
    format!("Вот твоя личная сводка за сегодня:\n\n{}", render_summary(summary))
}

pub fn summary_for_date(date_text: &str, summary: &DaySummary) -> String {
    format!(
        "Твоя сводка за <b>{}:</b>\n\n{}",
        escape_html(date_text),
        render_summary(summary)
    )
}

pub fn no_records_for(date_text: &str) -> String {
    format!(
        "❕ Нет записей за {}.\n\n<b>Попробуй другую дату!</b>",
        escape_html(date_text)
    )
}

pub fn clear_failed(err: &dyn std::fmt::Display) -> String {
    format!("Ошибка при очистке: {}", escape_html(&err.to_string()))
}

pub fn morning_quote(quote: &str) -> String {
    format!("⛅ Доброе утро!\n<b>{}</b>", escape_html(quote))
}
