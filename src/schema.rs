diesel::table! {
    users (id) {
        id -> Text,
        name -> Text,
        avatar_url -> Text,
    }
}

diesel::table! {
    channels (id) {
        id -> Text,
        name -> Text,
    }
}

diesel::table! {
    emojis (id) {
        id -> Text,
        name -> Text,
        url -> Text,
        animated -> Bool,
    }
}

diesel::table! {
    messages (id) {
        id -> Text,
        user_id -> Text,
        channel_id -> Text,
        sent_at -> BigInt,
        sent_hour -> Integer,
        sent_dow -> Integer,
        content -> Text,
    }
}

diesel::table! {
    replies (message_id) {
        message_id -> Text,
        reply_to -> Text,
    }
}

diesel::table! {
    attachments (id) {
        id -> Text,
        message_id -> Text,
        mime -> Text,
        url -> Text,
    }
}

diesel::table! {
    reactions (user_id, message_id, emoji_id) {
        user_id -> Text,
        message_id -> Text,
        emoji_id -> Text,
    }
}

diesel::joinable!(messages -> users (user_id));
diesel::joinable!(messages -> channels (channel_id));
diesel::joinable!(replies -> messages (message_id));
diesel::joinable!(attachments -> messages (message_id));
diesel::joinable!(reactions -> messages (message_id));
diesel::joinable!(reactions -> emojis (emoji_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    channels,
    emojis,
    messages,
    replies,
    attachments,
    reactions,
);
